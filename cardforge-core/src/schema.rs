//! Category Schema - The Fixed Rating Taxonomy
//!
//! Two disjoint sets: content-flag categories (leveled 0-3) and exemption
//! categories (boolean). Declaration order is the canonical render order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    #[error("Unknown orientation: {0}")]
    UnknownOrientation(String),

    #[error("Rating level out of range: {0}")]
    LevelOutOfRange(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
    Anime,
    Manga,
    Game,
    Book,
    Manual,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Movie,
        ContentType::Tv,
        ContentType::Anime,
        ContentType::Manga,
        ContentType::Game,
        ContentType::Book,
        ContentType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
            ContentType::Anime => "anime",
            ContentType::Manga => "manga",
            ContentType::Game => "game",
            ContentType::Book => "book",
            ContentType::Manual => "manual",
        }
    }

    /// Game-only categories are listed only in a game context.
    pub fn is_game(&self) -> bool {
        matches!(self, ContentType::Game)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownContentType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl FromStr for Orientation {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "horizontal" => Ok(Orientation::Horizontal),
            "vertical" => Ok(Orientation::Vertical),
            other => Err(SchemaError::UnknownOrientation(other.to_string())),
        }
    }
}

/// Per-category rating. Absent entries are equivalent to `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RatingLevel {
    #[default]
    None = 0,
    Mild = 1,
    Heavy = 2,
    Severe = 3,
}

impl RatingLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_none(self) -> bool {
        self == RatingLevel::None
    }
}

impl From<RatingLevel> for u8 {
    fn from(level: RatingLevel) -> u8 {
        level.as_u8()
    }
}

impl TryFrom<u8> for RatingLevel {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RatingLevel::None),
            1 => Ok(RatingLevel::Mild),
            2 => Ok(RatingLevel::Heavy),
            3 => Ok(RatingLevel::Severe),
            other => Err(SchemaError::LevelOutOfRange(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDefinition {
    pub id: &'static str,
    pub label: &'static str,
    /// Icon file stem. Sticker keys append the level, badge keys append `0`.
    pub icon: &'static str,
    pub is_game_only: bool,
}

const fn flag(id: &'static str, label: &'static str, icon: &'static str) -> CategoryDefinition {
    CategoryDefinition { id, label, icon, is_game_only: false }
}

const fn game_flag(id: &'static str, label: &'static str, icon: &'static str) -> CategoryDefinition {
    CategoryDefinition { id, label, icon, is_game_only: true }
}

static CONTENT_FLAGS: [CategoryDefinition; 10] = [
    flag("kufr", "كفريات", "كفريات"),
    flag("sex", "جنس", "جنس"),
    flag("nudity", "تعرّي", "تعري"),
    flag("vices", "مفاسد", "مفاسد"),
    flag("magic", "سحر", "سحر"),
    flag("lgbt", "شذوذ", "شذوذ"),
    flag("gore", "صادم", "صادم"),
    game_flag("addiction", "إدمانيّات", "إدمانيّات"),
    game_flag("lootbox", "قمار", "قمار"),
    game_flag("p2w", "تبذير", "تبذير"),
];

static EXEMPTIONS: [CategoryDefinition; 3] = [
    flag("nomusic", "لا موسيقى", "موسيقى"),
    flag("noprofanity", "لا ألفاظ نابية", "ألفاظ نابية"),
    flag("noaffairs", "لا علاقات حب", "علاقات حب"),
];

/// Content-flag categories in canonical order, game-only entries included
/// only when `is_game_context`.
pub fn list_content_flag_categories(is_game_context: bool) -> Vec<&'static CategoryDefinition> {
    CONTENT_FLAGS
        .iter()
        .filter(|c| is_game_context || !c.is_game_only)
        .collect()
}

pub fn list_exemption_categories() -> &'static [CategoryDefinition] {
    &EXEMPTIONS
}

pub fn find_content_flag(id: &str) -> Option<&'static CategoryDefinition> {
    CONTENT_FLAGS.iter().find(|c| c.id == id)
}

pub fn find_exemption(id: &str) -> Option<&'static CategoryDefinition> {
    EXEMPTIONS.iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_only_hidden_outside_game() {
        let ids: Vec<_> = list_content_flag_categories(false).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["kufr", "sex", "nudity", "vices", "magic", "lgbt", "gore"]);

        let game = list_content_flag_categories(true);
        assert_eq!(game.len(), 10);
        assert_eq!(game.last().map(|c| c.id), Some("p2w"));
    }

    #[test]
    fn test_order_stable_across_calls() {
        assert_eq!(list_content_flag_categories(true), list_content_flag_categories(true));
        assert_eq!(list_exemption_categories()[0].id, "nomusic");
    }

    #[test]
    fn test_sets_disjoint() {
        for e in list_exemption_categories() {
            assert!(find_content_flag(e.id).is_none());
        }
    }

    #[test]
    fn test_content_type_round_trip_names() {
        for t in ContentType::ALL {
            assert_eq!(t.as_str().parse::<ContentType>(), Ok(t));
        }
        assert!("podcast".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_rating_level_bounds() {
        assert_eq!(RatingLevel::try_from(2), Ok(RatingLevel::Heavy));
        assert_eq!(RatingLevel::try_from(4), Err(SchemaError::LevelOutOfRange(4)));
    }
}
