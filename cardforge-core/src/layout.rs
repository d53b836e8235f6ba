//! Layout Engine - Stickers, Badges, Text Fit and Element Boxes
//!
//! Sticker and badge derivation is a pure function of the composition state
//! and schema order. Synopsis auto-fit is measurement driven: each tier is
//! applied and re-measured before deciding. Title sizing uses character
//! count thresholds instead of measurement.

use image::RgbaImage;
use serde::Serialize;
use std::path::PathBuf;

use crate::config::DesignSettings;
use crate::schema::{self, Orientation, RatingLevel};
use crate::state::{CompositionState, OverlayElement, SynopsisSizeMode};

/// Average glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f32 = 0.5;
pub const LINE_HEIGHT: f32 = 1.5;

const TITLE_THRESHOLDS_HORIZONTAL: [usize; 3] = [15, 25, 40];
const TITLE_THRESHOLDS_VERTICAL: [usize; 3] = [10, 18, 30];

/// Canvas-relative box: `x`/`w` are fractions of the width, `y`/`h` of the height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

const fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    Rect { x, y, w, h }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CardElement {
    Background,
    Poster,
    ClassificationLabel,
    Title,
    Year,
    Genre,
    Synopsis,
    Stickers,
    Badges,
    Comment,
}

impl From<OverlayElement> for CardElement {
    fn from(element: OverlayElement) -> Self {
        match element {
            OverlayElement::ClassificationLabel => CardElement::ClassificationLabel,
            OverlayElement::Title => CardElement::Title,
            OverlayElement::StickersGrid => CardElement::Stickers,
        }
    }
}

/// Canvas height over width.
pub fn aspect_ratio(orientation: Orientation) -> f32 {
    match orientation {
        Orientation::Horizontal => 9.0 / 16.0,
        Orientation::Vertical => 4.0 / 3.0,
    }
}

/// Layout-computed box of an element, before any manual override.
pub fn default_box(element: CardElement, orientation: Orientation) -> Rect {
    use CardElement::*;
    match orientation {
        Orientation::Horizontal => match element {
            Background => rect(0.0, 0.0, 1.0, 1.0),
            Poster => rect(0.66, 0.08, 0.29, 0.84),
            ClassificationLabel => rect(0.04, 0.04, 0.30, 0.06),
            Title => rect(0.04, 0.11, 0.58, 0.14),
            Year => rect(0.04, 0.26, 0.12, 0.06),
            Genre => rect(0.17, 0.26, 0.45, 0.06),
            Synopsis => rect(0.04, 0.34, 0.58, 0.24),
            Stickers => rect(0.04, 0.60, 0.58, 0.20),
            Badges => rect(0.04, 0.81, 0.58, 0.07),
            Comment => rect(0.04, 0.89, 0.58, 0.07),
        },
        Orientation::Vertical => match element {
            Background => rect(0.0, 0.0, 1.0, 1.0),
            Poster => rect(0.25, 0.03, 0.50, 0.40),
            ClassificationLabel => rect(0.05, 0.44, 0.90, 0.04),
            Title => rect(0.05, 0.48, 0.90, 0.08),
            Year => rect(0.05, 0.56, 0.20, 0.04),
            Genre => rect(0.27, 0.56, 0.68, 0.04),
            Synopsis => rect(0.05, 0.61, 0.90, 0.14),
            Stickers => rect(0.05, 0.76, 0.90, 0.12),
            Badges => rect(0.05, 0.885, 0.90, 0.045),
            Comment => rect(0.05, 0.935, 0.90, 0.045),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerDescriptor {
    pub category_id: &'static str,
    pub level: RatingLevel,
    pub icon_key: String,
    pub fallback_icon_key: String,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDescriptor {
    pub category_id: &'static str,
    pub icon_key: String,
    pub label: &'static str,
}

/// One sticker per rated content flag, in canonical schema order.
pub fn derive_stickers(state: &CompositionState) -> Vec<StickerDescriptor> {
    schema::list_content_flag_categories(state.content_type().is_game())
        .into_iter()
        .filter_map(|c| {
            let level = state.rating(c.id);
            if level.is_none() {
                return None;
            }
            Some(StickerDescriptor {
                category_id: c.id,
                level,
                icon_key: format!("{}{}", c.icon, level.as_u8()),
                fallback_icon_key: c.icon.to_string(),
                label: c.label,
            })
        })
        .collect()
}

/// One badge per set exemption flag, in canonical schema order.
pub fn derive_badges(state: &CompositionState) -> Vec<BadgeDescriptor> {
    schema::list_exemption_categories()
        .iter()
        .filter(|c| state.badge(c.id))
        .map(|c| BadgeDescriptor {
            category_id: c.id,
            icon_key: format!("{}0", c.icon),
            label: c.label,
        })
        .collect()
}

pub trait IconSource {
    fn load(&self, key: &str) -> Option<RgbaImage>;
}

/// Icons stored as `<root>/<key>.png`.
pub struct DirIconSource {
    root: PathBuf,
}

impl DirIconSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IconSource for DirIconSource {
    fn load(&self, key: &str) -> Option<RgbaImage> {
        let path = self.root.join(format!("{key}.png"));
        match image::open(&path) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "icon load failed");
                None
            }
        }
    }
}

/// A source with no icons; everything renders as glyphs.
pub struct NoIcons;

impl IconSource for NoIcons {
    fn load(&self, _key: &str) -> Option<RgbaImage> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedIcon {
    Image { key: String, image: RgbaImage },
    Glyph(String),
}

/// Try `icon_key`, then `fallback_key`, then a text glyph of `raw_id`.
/// The result is never an empty slot.
pub fn resolve_icon(
    source: &dyn IconSource,
    icon_key: &str,
    fallback_key: Option<&str>,
    raw_id: &str,
) -> ResolvedIcon {
    for key in std::iter::once(icon_key).chain(fallback_key) {
        if let Some(image) = source.load(key) {
            return ResolvedIcon::Image { key: key.to_string(), image };
        }
    }
    let glyph = if raw_id.trim().is_empty() { "?" } else { raw_id };
    ResolvedIcon::Glyph(glyph.to_string())
}

/// Synopsis scale tiers, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleTier {
    Base,
    Medium,
    Heavy,
    Extreme,
}

impl ScaleTier {
    pub const ORDERED: [ScaleTier; 4] =
        [ScaleTier::Base, ScaleTier::Medium, ScaleTier::Heavy, ScaleTier::Extreme];

    pub fn factor(self) -> f32 {
        match self {
            ScaleTier::Base => 1.0,
            ScaleTier::Medium => 0.85,
            ScaleTier::Heavy => 0.72,
            ScaleTier::Extreme => 0.6,
        }
    }
}

/// Live text measurement. `content_height` applies `tier` to the text
/// block and measures it again.
pub trait TextMeasure {
    fn container_height(&self) -> f32;
    fn content_height(&mut self, tier: ScaleTier) -> f32;
}

/// Pick the synopsis tier. Auto mode tries tiers in increasing order and
/// stops at the first that fits, staying at `Extreme` if none does.
pub fn fit_synopsis(mode: SynopsisSizeMode, measure: &mut dyn TextMeasure) -> ScaleTier {
    match mode {
        SynopsisSizeMode::Large => ScaleTier::Base,
        SynopsisSizeMode::Medium => ScaleTier::Medium,
        SynopsisSizeMode::Small => ScaleTier::Heavy,
        SynopsisSizeMode::Auto => {
            let container = measure.container_height();
            for tier in ScaleTier::ORDERED {
                if measure.content_height(tier) <= container {
                    return tier;
                }
            }
            ScaleTier::Extreme
        }
    }
}

/// Greedy word wrap with an average-advance width estimate.
pub fn wrap_lines(text: &str, box_width: f32, font_px: f32) -> Vec<String> {
    let max_chars = ((box_width / (font_px * GLYPH_ADVANCE)).floor() as usize).max(1);
    let mut lines = vec![];

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                lines.push(word.drain(..max_chars).collect());
            }
            let needed = if len == 0 { word.len() } else { len + 1 + word.len() };
            if needed > max_chars && len > 0 {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            line.extend(word.iter());
            len += word.len();
        }
        lines.push(line);
    }
    lines
}

/// Measures a text block wrapped into a fixed box.
pub struct WrapMeasure<'a> {
    text: &'a str,
    box_width: f32,
    box_height: f32,
    base_font_px: f32,
    measured: Vec<ScaleTier>,
}

impl<'a> WrapMeasure<'a> {
    pub fn new(text: &'a str, box_width: f32, box_height: f32, base_font_px: f32) -> Self {
        Self { text, box_width, box_height, base_font_px, measured: vec![] }
    }

    /// Tiers measured so far, in order.
    pub fn measured(&self) -> &[ScaleTier] {
        &self.measured
    }
}

impl TextMeasure for WrapMeasure<'_> {
    fn container_height(&self) -> f32 {
        self.box_height
    }

    fn content_height(&mut self, tier: ScaleTier) -> f32 {
        self.measured.push(tier);
        let font = self.base_font_px * tier.factor();
        wrap_lines(self.text, self.box_width, font).len() as f32 * font * LINE_HEIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitleSize {
    Normal,
    Medium,
    Long,
    ExtraLong,
}

impl TitleSize {
    pub fn factor(self) -> f32 {
        match self {
            TitleSize::Normal => 1.0,
            TitleSize::Medium => 0.8,
            TitleSize::Long => 0.65,
            TitleSize::ExtraLong => 0.5,
        }
    }
}

/// Title size class from character count alone. Vertical cards are
/// narrower and switch classes sooner.
pub fn title_size_class(title: &str, orientation: Orientation) -> TitleSize {
    let [normal, medium, long] = match orientation {
        Orientation::Horizontal => TITLE_THRESHOLDS_HORIZONTAL,
        Orientation::Vertical => TITLE_THRESHOLDS_VERTICAL,
    };
    match title.chars().count() {
        n if n <= normal => TitleSize::Normal,
        n if n <= medium => TitleSize::Medium,
        n if n <= long => TitleSize::Long,
        _ => TitleSize::ExtraLong,
    }
}

/// Everything the view layer derives from the state for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub stickers: Vec<StickerDescriptor>,
    pub badges: Vec<BadgeDescriptor>,
    pub title_size: TitleSize,
    pub synopsis_tier: ScaleTier,
}

/// Recompute the derived view at a container width of `width_px`.
pub fn compute_view(state: &CompositionState, design: &DesignSettings, width_px: f32) -> CardView {
    let orientation = state.orientation();
    let sizes = design.sizes(orientation);
    let synopsis_box = default_box(CardElement::Synopsis, orientation);
    let height_px = width_px * aspect_ratio(orientation);

    let mut measure = WrapMeasure::new(
        &state.metadata().synopsis,
        synopsis_box.w * width_px,
        synopsis_box.h * height_px,
        sizes.synopsis_size / 100.0 * width_px,
    );

    CardView {
        stickers: derive_stickers(state),
        badges: derive_badges(state),
        title_size: title_size_class(&state.metadata().title, orientation),
        synopsis_tier: fit_synopsis(state.synopsis_size_mode(), &mut measure),
    }
}
