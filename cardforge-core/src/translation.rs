//! Translation Table - Static Genre Names + Cached Remote Translator

use std::collections::HashMap;

use crate::proxy::{ProxyClient, ProxyKind};

/// Cache keys use this many leading characters of the source text.
pub const CACHE_KEY_CHARS: usize = 50;

/// Separator used when re-joining translated genre lists.
pub const ARABIC_COMMA: &str = "، ";

/// Arabic name for a known English genre.
pub fn translate_genre(name: &str) -> Option<&'static str> {
    let arabic = match name {
        "Action" => "أكشن",
        "Adventure" => "مغامرة",
        "Comedy" => "كوميديا",
        "Drama" => "دراما",
        "Fantasy" => "خيال",
        "Horror" => "رعب",
        "Mystery" => "غموض",
        "Romance" => "رومانسي",
        "Sci-Fi" | "Science Fiction" => "خيال علمي",
        "Thriller" => "إثارة",
        "Supernatural" => "خارق للطبيعة",
        "Seinen" => "سينين",
        "Shounen" => "شونين",
        "Shoujo" => "شوجو",
        "Josei" => "جوسي",
        "Isekai" => "إيسيكاي",
        "Mecha" => "ميكا",
        "Slice of Life" => "شريحة من الحياة",
        "Sports" => "رياضة",
        "Ecchi" => "إيتشي",
        "Harem" => "حريم",
        "School" => "مدرسي",
        "Music" => "موسيقى",
        "Psychological" => "نفسي",
        "Historical" => "تاريخي",
        "Military" => "عسكري",
        "Demons" => "شياطين",
        "Vampire" => "مصاص دماء",
        "Magic" => "سحر",
        "RPG" => "آر بي جي",
        "Action RPG" => "أكشن آر بي جي",
        "Shooter" => "إطلاق نار",
        "Platformer" => "منصات",
        "Strategy" => "استراتيجية",
        "Simulation" => "محاكاة",
        "Fighting" => "قتال",
        "Racing" => "سباق",
        "Puzzle" => "ألغاز",
        "Arcade" => "أركيد",
        "Indie" => "مستقل",
        "Massively Multiplayer" => "متعدد اللاعبين الضخم",
        "Casual" => "كاجوال",
        "Family" => "عائلي",
        "Board Games" => "ألعاب لوحية",
        "Educational" => "تعليمي",
        "Fiction" => "خيال",
        "Non-Fiction" => "واقعي",
        "Biography" => "سيرة ذاتية",
        "Self-Help" => "مساعدة ذاتية",
        "Poetry" => "شعر",
        "Philosophy" => "فلسفة",
        "Documentary" => "وثائقي",
        "Animation" => "رسوم متحركة",
        "Crime" => "جريمة",
        "War" => "حرب",
        "Western" => "غربي",
        "Musical" => "موسيقي",
        "History" => "تاريخ",
        "Game" => "لعبة",
        _ => return None,
    };
    Some(arabic)
}

/// Translate a comma-separated genre list entry by entry. Unknown entries
/// pass through unchanged.
pub fn translate_genres(genres: &str) -> String {
    if genres.trim().is_empty() {
        return String::new();
    }
    genres
        .split(',')
        .map(str::trim)
        .map(|g| translate_genre(g).unwrap_or(g))
        .collect::<Vec<_>>()
        .join(ARABIC_COMMA)
}

fn cache_key(text: &str) -> String {
    text.chars().take(CACHE_KEY_CHARS).collect()
}

/// Remote long-form translator with a process-lifetime cache.
///
/// The cache is unbounded and keyed by a text prefix, so two texts sharing
/// their first 50 characters share one translation.
#[derive(Debug, Default)]
pub struct Translator {
    cache: HashMap<String, String>,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `text`, falling back to the original on any failure.
    pub fn translate(&mut self, proxy: &dyn ProxyClient, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let key = cache_key(text);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let response = match proxy.fetch_json(ProxyKind::Translate, text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "translation failed, keeping original text");
                return text.to_string();
            }
        };

        let ok = response.get("responseStatus").and_then(|s| s.as_u64()) == Some(200);
        let translated = response
            .pointer("/responseData/translatedText")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty());

        match translated {
            Some(translated) if ok => {
                self.cache.insert(key, translated.to_string());
                translated.to_string()
            }
            _ => {
                tracing::warn!("translation response missing text, keeping original text");
                text.to_string()
            }
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
