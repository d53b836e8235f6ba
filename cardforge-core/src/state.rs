//! Composition State - The Single Mutable Card Model
//!
//! All writes go through named mutators. A content-type switch is a
//! destructive reset, not a merge, and bumps the generation counter so
//! in-flight hydrations started before the switch can be recognised as stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::schema::{self, ContentType, Orientation, RatingLevel};

/// User-entered synopsis limits (roughly four lines on the card).
pub const SYNOPSIS_MAX_CHARS: usize = 350;
pub const SYNOPSIS_MAX_LINES: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Category {0} is only available for games")]
    GameOnlyCategory(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: String,
    pub year: String,
    /// Empty, a `data:` URI (user upload) or a remote URL.
    pub poster_ref: String,
    pub genre: String,
    pub synopsis: String,
    pub comment: String,
}

impl Metadata {
    pub fn defaults_for(content_type: ContentType) -> Self {
        let title = match content_type {
            ContentType::Movie => "MOVIE TITLE",
            ContentType::Tv => "SERIES TITLE",
            ContentType::Anime => "ANIME TITLE",
            ContentType::Manga => "MANGA TITLE",
            ContentType::Game => "GAME TITLE",
            ContentType::Book => "BOOK TITLE",
            ContentType::Manual => "عنوان العمل",
        };
        Self {
            title: title.to_string(),
            year: "2023".to_string(),
            poster_ref: String::new(),
            genre: "Genre".to_string(),
            synopsis: String::new(),
            comment: String::new(),
        }
    }
}

/// Fields a catalog selection fills in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFields {
    pub title: String,
    pub year: String,
    pub poster_ref: String,
    pub genre: String,
    pub synopsis: String,
}

/// One step of a hydration: the initial catalog fields, then corrections
/// to a single field as slower lookups finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationUpdate {
    Catalog(CatalogFields),
    Synopsis(String),
    Poster(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynopsisSizeMode {
    #[default]
    Auto,
    Small,
    Medium,
    Large,
}

/// Overlay elements that drag mode may reposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayElement {
    ClassificationLabel,
    Title,
    StickersGrid,
}

impl OverlayElement {
    pub const ALL: [OverlayElement; 3] = [
        OverlayElement::ClassificationLabel,
        OverlayElement::Title,
        OverlayElement::StickersGrid,
    ];
}

/// Manual placement in canvas-relative units (fractions of width/height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionState {
    content_type: ContentType,
    orientation: Orientation,
    synopsis_size_mode: SynopsisSizeMode,
    ratings: BTreeMap<String, RatingLevel>,
    badges: BTreeMap<String, bool>,
    metadata: Metadata,
    manual_overrides: BTreeMap<OverlayElement, ManualOverride>,
    #[serde(skip)]
    generation: u64,
}

impl CompositionState {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            orientation: Orientation::Horizontal,
            synopsis_size_mode: SynopsisSizeMode::Auto,
            ratings: BTreeMap::new(),
            badges: BTreeMap::new(),
            metadata: Metadata::defaults_for(content_type),
            manual_overrides: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn synopsis_size_mode(&self) -> SynopsisSizeMode {
        self.synopsis_size_mode
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn ratings(&self) -> &BTreeMap<String, RatingLevel> {
        &self.ratings
    }

    pub fn badges(&self) -> &BTreeMap<String, bool> {
        &self.badges
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Switch content type. Always resets ratings, badges and metadata,
    /// even when the type is unchanged.
    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = content_type;
        self.ratings.clear();
        self.badges.clear();
        self.metadata = Metadata::defaults_for(content_type);
        self.generation += 1;
    }

    /// Vertical orientation drops every manual override.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
        if orientation == Orientation::Vertical {
            self.manual_overrides.clear();
        }
    }

    pub fn set_synopsis_size_mode(&mut self, mode: SynopsisSizeMode) {
        self.synopsis_size_mode = mode;
    }

    pub fn rating(&self, id: &str) -> RatingLevel {
        self.ratings.get(id).copied().unwrap_or_default()
    }

    /// Setting `None` removes the entry so absence and explicit None stay
    /// interchangeable.
    pub fn set_rating(&mut self, id: &str, level: RatingLevel) -> Result<(), StateError> {
        let category = schema::find_content_flag(id)
            .ok_or_else(|| StateError::UnknownCategory(id.to_string()))?;
        if category.is_game_only && !self.content_type.is_game() {
            return Err(StateError::GameOnlyCategory(id.to_string()));
        }

        if level.is_none() {
            self.ratings.remove(id);
        } else {
            self.ratings.insert(id.to_string(), level);
        }
        Ok(())
    }

    pub fn badge(&self, id: &str) -> bool {
        self.badges.get(id).copied().unwrap_or(false)
    }

    pub fn set_badge(&mut self, id: &str, on: bool) -> Result<(), StateError> {
        if schema::find_exemption(id).is_none() {
            return Err(StateError::UnknownCategory(id.to_string()));
        }
        if on {
            self.badges.insert(id.to_string(), true);
        } else {
            self.badges.remove(id);
        }
        Ok(())
    }

    /// Flip a badge and return its new value.
    pub fn toggle_badge(&mut self, id: &str) -> Result<bool, StateError> {
        let next = !self.badge(id);
        self.set_badge(id, next)?;
        Ok(next)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.metadata.title = title.into();
    }

    pub fn set_year(&mut self, year: impl Into<String>) {
        self.metadata.year = year.into();
    }

    pub fn set_genre(&mut self, genre: impl Into<String>) {
        self.metadata.genre = genre.into();
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.metadata.comment = comment.into();
    }

    pub fn set_poster_ref(&mut self, poster_ref: impl Into<String>) {
        self.metadata.poster_ref = poster_ref.into();
    }

    /// In-place synopsis edit, capped to what fits on the card.
    pub fn set_synopsis(&mut self, text: &str) {
        let capped: String = text.chars().take(SYNOPSIS_MAX_CHARS).collect();
        self.metadata.synopsis = clip_lines(&capped, SYNOPSIS_MAX_LINES);
    }

    /// Apply a hydration result. Results started under an older generation
    /// are discarded and `false` is returned. Fields the update does not
    /// name, such as the comment, are left alone.
    pub fn apply_hydration(&mut self, generation: u64, update: HydrationUpdate) -> bool {
        if generation != self.generation {
            tracing::debug!(
                stale = generation,
                current = self.generation,
                "discarding stale hydration result"
            );
            return false;
        }
        match update {
            HydrationUpdate::Catalog(fields) => {
                self.metadata.title = fields.title;
                self.metadata.year = fields.year;
                self.metadata.poster_ref = fields.poster_ref;
                self.metadata.genre = fields.genre;
                self.metadata.synopsis = fields.synopsis;
            }
            HydrationUpdate::Synopsis(synopsis) => self.metadata.synopsis = synopsis,
            HydrationUpdate::Poster(poster_ref) => self.metadata.poster_ref = poster_ref,
        }
        true
    }

    pub fn manual_override(&self, element: OverlayElement) -> Option<ManualOverride> {
        self.manual_overrides.get(&element).copied()
    }

    pub fn manual_overrides(&self) -> &BTreeMap<OverlayElement, ManualOverride> {
        &self.manual_overrides
    }

    pub fn set_manual_override(&mut self, element: OverlayElement, value: ManualOverride) {
        self.manual_overrides.insert(element, value);
    }

    pub fn clear_manual_overrides(&mut self) {
        self.manual_overrides.clear();
    }
}

impl Default for CompositionState {
    fn default() -> Self {
        Self::new(ContentType::Anime)
    }
}

/// Keep at most `max` lines of `text`.
pub fn clip_lines(text: &str, max: usize) -> String {
    text.split('\n').take(max).collect::<Vec<_>>().join("\n")
}
