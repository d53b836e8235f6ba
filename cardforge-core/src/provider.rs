//! Metadata Providers - Normalizing Five Catalog Shapes
//!
//! One closed variant per catalog family. `search` and `hydrate` never
//! return errors: network failures and missing fields degrade to empty
//! results, placeholders or untranslated text.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::proxy::{ProxyClient, ProxyError, ProxyKind};
use crate::schema::ContentType;
use crate::state::{clip_lines, CatalogFields, HydrationUpdate, Metadata, SYNOPSIS_MAX_LINES};
use crate::translation::{translate_genre, translate_genres, Translator, ARABIC_COMMA};

pub const MAX_RESULTS: usize = 5;
pub const PLACEHOLDER_THUMBNAIL: &str = "assets/placeholder.png";
pub const NO_TITLE: &str = "No Title";
pub const GENERIC_GENRE: &str = "تصنيف";
pub const NO_DESCRIPTION: &str = "لا يوجد وصف متاح";
pub const TRANSLATING: &str = "جاري الترجمة...";
pub const GAME_DATA_PENDING: &str = "بيانات اللعبة...";

const TMDB_THUMB_BASE: &str = "https://image.tmdb.org/t/p/w92";
const TMDB_POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
const OPEN_LIBRARY_COVERS: &str = "https://covers.openlibrary.org/b/id";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network failure: {0}")]
    NetworkFailure(#[from] ProxyError),

    #[error("Expected field missing: {0}")]
    NormalizationMiss(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMedia {
    Movie,
    Tv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JikanMedia {
    Anime,
    Manga,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataProvider {
    /// TMDB-shaped `results[]`.
    Screen(ScreenMedia),
    /// RAWG-shaped `results[]`, plus details and SteamGridDB cover lookups.
    Game,
    /// Jikan-shaped `data[]`.
    Jikan(JikanMedia),
    /// Google Books `items[]` or OpenLibrary `docs[]`.
    Book,
    /// No catalog; the user fills everything in.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub title: String,
    pub poster_thumbnail: String,
    #[serde(skip)]
    pub raw_payload: Value,
}

impl MetadataProvider {
    pub fn for_content_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Movie => MetadataProvider::Screen(ScreenMedia::Movie),
            ContentType::Tv => MetadataProvider::Screen(ScreenMedia::Tv),
            ContentType::Game => MetadataProvider::Game,
            ContentType::Anime => MetadataProvider::Jikan(JikanMedia::Anime),
            ContentType::Manga => MetadataProvider::Jikan(JikanMedia::Manga),
            ContentType::Book => MetadataProvider::Book,
            ContentType::Manual => MetadataProvider::Manual,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            MetadataProvider::Screen(ScreenMedia::Movie) => ContentType::Movie,
            MetadataProvider::Screen(ScreenMedia::Tv) => ContentType::Tv,
            MetadataProvider::Game => ContentType::Game,
            MetadataProvider::Jikan(JikanMedia::Anime) => ContentType::Anime,
            MetadataProvider::Jikan(JikanMedia::Manga) => ContentType::Manga,
            MetadataProvider::Book => ContentType::Book,
            MetadataProvider::Manual => ContentType::Manual,
        }
    }

    /// Up to five normalized candidates. Failures yield an empty list.
    pub fn search(&self, proxy: &dyn ProxyClient, query: &str) -> Vec<CandidateResult> {
        let query = query.trim();
        if query.is_empty() {
            return vec![];
        }

        match self.try_search(proxy, query) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    content_type = %self.content_type(),
                    error = %e,
                    "search degraded to empty results"
                );
                vec![]
            }
        }
    }

    fn try_search(
        &self,
        proxy: &dyn ProxyClient,
        query: &str,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        let Some(kind) = ProxyKind::search_for(self.content_type()) else {
            return Ok(vec![]);
        };
        let payload = proxy.fetch_json(kind, query)?;

        let list = match self {
            MetadataProvider::Screen(_) | MetadataProvider::Game => payload.get("results"),
            MetadataProvider::Jikan(_) => payload.get("data"),
            MetadataProvider::Book => payload.get("items").or_else(|| payload.get("docs")),
            MetadataProvider::Manual => None,
        };
        let items = list
            .and_then(Value::as_array)
            .ok_or(ProviderError::NormalizationMiss("result list"))?;

        Ok(items
            .iter()
            .filter(|item| !self.is_excluded(item))
            .take(MAX_RESULTS)
            .map(|item| CandidateResult {
                title: candidate_title(item),
                poster_thumbnail: self.thumbnail(item),
                raw_payload: item.clone(),
            })
            .collect())
    }

    /// Japanese-origin screen results belong to the anime provider.
    fn is_excluded(&self, item: &Value) -> bool {
        if !matches!(self, MetadataProvider::Screen(_)) {
            return false;
        }
        let from_japan = item
            .get("origin_country")
            .and_then(Value::as_array)
            .is_some_and(|c| c.iter().any(|v| v.as_str() == Some("JP")));
        from_japan || str_at(item, "/original_language") == Some("ja")
    }

    fn thumbnail(&self, item: &Value) -> String {
        let thumb = match self {
            MetadataProvider::Screen(_) => {
                str_at(item, "/poster_path").map(|p| format!("{TMDB_THUMB_BASE}{p}"))
            }
            MetadataProvider::Game => str_at(item, "/background_image").map(str::to_string),
            MetadataProvider::Jikan(_) => {
                str_at(item, "/images/jpg/small_image_url").map(str::to_string)
            }
            MetadataProvider::Book => str_at(item, "/volumeInfo/imageLinks/thumbnail")
                .map(str::to_string)
                .or_else(|| open_library_cover(item, 'S')),
            MetadataProvider::Manual => None,
        };
        thumb.unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string())
    }

    /// Start hydrating `candidate`. The initial catalog fields are already
    /// renderable; remaining stages arrive through [`Hydration::advance`].
    pub fn hydrate(&self, candidate: &CandidateResult, generation: u64) -> Hydration {
        let item = &candidate.raw_payload;
        let mut metadata = Metadata::defaults_for(self.content_type());
        metadata.title = candidate.title.clone();
        let mut pending = VecDeque::new();

        match self {
            MetadataProvider::Screen(_) => {
                metadata.year = year_of(
                    str_at(item, "/release_date").or_else(|| str_at(item, "/first_air_date")),
                );
                metadata.poster_ref = str_at(item, "/poster_path")
                    .map(|p| format!("{TMDB_POSTER_BASE}{p}"))
                    .unwrap_or_default();
                metadata.genre = screen_genres(item);
                queue_synopsis(&mut metadata, &mut pending, str_at(item, "/overview"));
            }
            MetadataProvider::Game => {
                metadata.year = year_of(str_at(item, "/released"));
                metadata.poster_ref = str_at(item, "/background_image")
                    .unwrap_or_default()
                    .to_string();
                let genres = names_of(item.get("genres"));
                metadata.genre = if genres.is_empty() {
                    translate_genres("Game")
                } else {
                    translate_genres(&genres)
                };
                metadata.synopsis = GAME_DATA_PENDING.to_string();

                let details_key = str_at(item, "/slug")
                    .map(str::to_string)
                    .or_else(|| item.get("id").and_then(Value::as_u64).map(|id| id.to_string()));
                match details_key {
                    Some(key) => pending.push_back(HydrationStage::GameDetails(key)),
                    None => metadata.synopsis = NO_DESCRIPTION.to_string(),
                }
                pending.push_back(HydrationStage::GameCover(candidate.title.clone()));
            }
            MetadataProvider::Jikan(_) => {
                metadata.year = item
                    .get("year")
                    .and_then(Value::as_u64)
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| {
                        year_of(
                            str_at(item, "/aired/from").or_else(|| str_at(item, "/published/from")),
                        )
                    });
                metadata.poster_ref = str_at(item, "/images/jpg/large_image_url")
                    .unwrap_or_default()
                    .to_string();
                metadata.genre = or_generic(translate_genres(&names_of(item.get("genres"))));
                queue_synopsis(&mut metadata, &mut pending, str_at(item, "/synopsis"));
            }
            MetadataProvider::Book => {
                if item.get("volumeInfo").is_some() {
                    metadata.year = year_of(str_at(item, "/volumeInfo/publishedDate"));
                    metadata.poster_ref = str_at(item, "/volumeInfo/imageLinks/thumbnail")
                        .unwrap_or_default()
                        .to_string();
                    let categories = joined_strings(item.pointer("/volumeInfo/categories"), usize::MAX);
                    metadata.genre = or_generic(translate_genres(&categories));
                    queue_synopsis(
                        &mut metadata,
                        &mut pending,
                        str_at(item, "/volumeInfo/description"),
                    );
                } else {
                    metadata.year = item
                        .get("first_publish_year")
                        .and_then(Value::as_u64)
                        .map(|y| y.to_string())
                        .unwrap_or_default();
                    metadata.poster_ref = open_library_cover(item, 'L').unwrap_or_default();
                    let subjects = joined_strings(item.get("subject"), 3);
                    metadata.genre = or_generic(translate_genres(&subjects));
                    queue_synopsis(&mut metadata, &mut pending, None);
                }
            }
            MetadataProvider::Manual => {}
        }

        Hydration { generation, metadata, pending }
    }
}

/// One slow sub-fetch of a staged hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HydrationStage {
    TranslateSynopsis(String),
    GameDetails(String),
    GameCover(String),
}

/// A hydration in progress. Every intermediate metadata value is renderable.
#[derive(Debug, Clone)]
pub struct Hydration {
    generation: u64,
    metadata: Metadata,
    pending: VecDeque<HydrationStage>,
}

impl Hydration {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The provider's view of the metadata so far.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The catalog fields to apply on selection.
    pub fn initial(&self) -> HydrationUpdate {
        let md = &self.metadata;
        HydrationUpdate::Catalog(CatalogFields {
            title: md.title.clone(),
            year: md.year.clone(),
            poster_ref: md.poster_ref.clone(),
            genre: md.genre.clone(),
            synopsis: md.synopsis.clone(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_stages(&self) -> usize {
        self.pending.len()
    }

    /// Run pending stages until one yields a correction. `None` once
    /// nothing is pending.
    pub fn advance(
        &mut self,
        proxy: &dyn ProxyClient,
        translator: &mut Translator,
    ) -> Option<HydrationUpdate> {
        while let Some(stage) = self.pending.pop_front() {
            let update = match stage {
                HydrationStage::TranslateSynopsis(text) => {
                    let translated = translator.translate(proxy, &text);
                    HydrationUpdate::Synopsis(clip_lines(&translated, SYNOPSIS_MAX_LINES))
                }
                HydrationStage::GameDetails(key) => {
                    HydrationUpdate::Synopsis(match game_description(proxy, &key) {
                        Ok(description) => clip_lines(
                            &translator.translate(proxy, &description),
                            SYNOPSIS_MAX_LINES,
                        ),
                        Err(e) => {
                            tracing::warn!(game = %key, error = %e, "game details unavailable");
                            NO_DESCRIPTION.to_string()
                        }
                    })
                }
                HydrationStage::GameCover(name) => match game_cover(proxy, &name) {
                    Ok(url) => HydrationUpdate::Poster(url),
                    Err(e) => {
                        tracing::debug!(game = %name, error = %e, "no cover art, keeping poster");
                        continue;
                    }
                },
            };

            match &update {
                HydrationUpdate::Synopsis(text) => self.metadata.synopsis = text.clone(),
                HydrationUpdate::Poster(url) => self.metadata.poster_ref = url.clone(),
                HydrationUpdate::Catalog(_) => {}
            }
            return Some(update);
        }
        None
    }
}

fn game_description(proxy: &dyn ProxyClient, key: &str) -> Result<String, ProviderError> {
    let details = proxy.fetch_json(ProxyKind::GameDetails, key)?;
    let description = str_at(&details, "/description_raw")
        .map(str::to_string)
        .or_else(|| str_at(&details, "/description").map(strip_tags))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or(ProviderError::NormalizationMiss("description"))?;
    Ok(description)
}

fn game_cover(proxy: &dyn ProxyClient, name: &str) -> Result<String, ProviderError> {
    let grids = proxy.fetch_json(ProxyKind::GameCover, name)?;
    if grids.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(ProviderError::NormalizationMiss("success"));
    }
    str_at(&grids, "/data/0/url")
        .map(str::to_string)
        .ok_or(ProviderError::NormalizationMiss("data[0].url"))
}

fn queue_synopsis(
    metadata: &mut Metadata,
    pending: &mut VecDeque<HydrationStage>,
    source: Option<&str>,
) {
    match source.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => {
            metadata.synopsis = TRANSLATING.to_string();
            pending.push_back(HydrationStage::TranslateSynopsis(text.to_string()));
        }
        None => metadata.synopsis = NO_DESCRIPTION.to_string(),
    }
}

fn candidate_title(item: &Value) -> String {
    ["/title", "/name", "/title_english", "/volumeInfo/title"]
        .iter()
        .find_map(|p| str_at(item, p).filter(|t| !t.is_empty()))
        .unwrap_or(NO_TITLE)
        .to_string()
}

fn screen_genres(item: &Value) -> String {
    let names: Vec<&str> = item
        .get("genre_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_u64).filter_map(tmdb_genre).collect())
        .unwrap_or_default();
    if names.is_empty() {
        return GENERIC_GENRE.to_string();
    }
    names
        .into_iter()
        .map(|n| translate_genre(n).unwrap_or(n))
        .collect::<Vec<_>>()
        .join(ARABIC_COMMA)
}

fn tmdb_genre(id: u64) -> Option<&'static str> {
    let name = match id {
        28 => "Action",
        12 => "Adventure",
        16 => "Animation",
        35 => "Comedy",
        80 => "Crime",
        99 => "Documentary",
        18 => "Drama",
        10751 => "Family",
        14 => "Fantasy",
        36 => "History",
        27 => "Horror",
        10402 => "Music",
        9648 => "Mystery",
        10749 => "Romance",
        878 => "Science Fiction",
        53 => "Thriller",
        10752 => "War",
        37 => "Western",
        10759 => "Action",
        10765 => "Sci-Fi",
        10768 => "War",
        _ => return None,
    };
    Some(name)
}

fn open_library_cover(item: &Value, size: char) -> Option<String> {
    item.get("cover_i")
        .and_then(Value::as_u64)
        .map(|id| format!("{OPEN_LIBRARY_COVERS}/{id}-{size}.jpg"))
}

fn str_at<'a>(item: &'a Value, pointer: &str) -> Option<&'a str> {
    item.pointer(pointer).and_then(Value::as_str)
}

fn names_of(list: Option<&Value>) -> String {
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|g| g.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn joined_strings(list: Option<&Value>, limit: usize) -> String {
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(limit)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn or_generic(genre: String) -> String {
    if genre.is_empty() {
        GENERIC_GENRE.to_string()
    } else {
        genre
    }
}

fn year_of(date: Option<&str>) -> String {
    date.map(|d| d.chars().take(4).collect()).unwrap_or_default()
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
