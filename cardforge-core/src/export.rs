//! Export Pipeline - Live Card to Downloadable PNG
//!
//! CRITICAL: the off-screen container is unmounted on every path. It is an
//! RAII guard, so an early return from any step still removes it.

use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use resvg::tiny_skia;
use resvg::usvg;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ExportSettings;
use crate::hashing::{composition_fingerprint, sha256_hex};
use crate::layout::{wrap_lines, ResolvedIcon, LINE_HEIGHT};
use crate::state::CompositionState;
use crate::visual::{encode_data_uri, NodeContent, VisualTree};

const CARD_BACKGROUND: &str = "#101014";
const TEXT_COLOR: &str = "#ffffff";
const GLYPH_FILL: &str = "#2b2b33";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Download failed: {0}")]
    Download(#[from] std::io::Error),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Visible export status, shown on the export button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ExportStatus {
    #[default]
    Idle,
    Exporting,
    Failed(String),
}

impl ExportStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExportStatus::Idle => "EXPORT",
            ExportStatus::Exporting => "جاري التصدير...",
            ExportStatus::Failed(_) => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReceipt {
    pub id: String,
    pub filename: String,
    pub location: String,
    pub size: [u32; 2],
    pub created_at: DateTime<Utc>,
    pub png_sha256: String,
    pub composition_hash: String,
}

/// Holds the off-screen containers currently mounted.
#[derive(Debug, Default)]
pub struct Stage {
    next_id: u64,
    mounted: BTreeSet<u64>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, tree: VisualTree) -> OffscreenContainer<'_> {
        let id = self.next_id;
        self.next_id += 1;
        self.mounted.insert(id);
        tracing::debug!(id, width = tree.width_px, "mounted off-screen container");
        OffscreenContainer { stage: self, id, tree }
    }

    pub fn offscreen_count(&self) -> usize {
        self.mounted.len()
    }
}

/// A mounted off-screen copy of the card. Unmounted on drop.
pub struct OffscreenContainer<'a> {
    stage: &'a mut Stage,
    id: u64,
    tree: VisualTree,
}

impl OffscreenContainer<'_> {
    pub fn tree(&self) -> &VisualTree {
        &self.tree
    }
}

impl Drop for OffscreenContainer<'_> {
    fn drop(&mut self) {
        self.stage.mounted.remove(&self.id);
        tracing::debug!(id = self.id, "removed off-screen container");
    }
}

pub trait Rasterizer {
    fn rasterize(&self, tree: &VisualTree, width: u32, height: u32) -> Result<RgbaImage, ExportError>;
}

pub trait DownloadSink {
    /// Deliver a finished file. Returns where it went.
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<String, ExportError>;
}

/// Saves downloads into a directory. Files appear complete or not at all.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<String, ExportError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        let partial = self.dir.join(format!("{filename}.part"));

        if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, &path)) {
            if let Err(cleanup) = fs::remove_file(&partial) {
                tracing::debug!(path = %partial.display(), error = %cleanup, "no partial file to remove");
            }
            return Err(e.into());
        }
        Ok(path.display().to_string())
    }
}

/// `<prefix>-<title>.png`, or `<prefix>-Card.png` without a title.
pub fn export_filename(prefix: &str, title: &str) -> String {
    let title: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let title = if title.is_empty() { "Card" } else { title.as_str() };
    format!("{prefix}-{title}.png")
}

pub struct ExportPipeline {
    settings: ExportSettings,
    stage: Stage,
    status: ExportStatus,
}

impl ExportPipeline {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            stage: Stage::new(),
            status: ExportStatus::Idle,
        }
    }

    pub fn status(&self) -> &ExportStatus {
        &self.status
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Snapshot `live` at the export width and deliver it as a PNG.
    ///
    /// Failures are returned and also recorded as a visible status.
    #[tracing::instrument(skip_all, fields(title = %state.metadata().title))]
    pub fn export(
        &mut self,
        live: &VisualTree,
        state: &CompositionState,
        rasterizer: &dyn Rasterizer,
        sink: &mut dyn DownloadSink,
    ) -> Result<ExportReceipt, ExportError> {
        self.status = ExportStatus::Exporting;

        let result = Self::run(&self.settings, &mut self.stage, live, state, rasterizer, sink);

        self.status = match &result {
            Ok(receipt) => {
                tracing::info!(filename = %receipt.filename, "card exported");
                ExportStatus::Idle
            }
            Err(e) => {
                tracing::error!(error = %e, "export failed");
                ExportStatus::Failed(e.to_string())
            }
        };
        result
    }

    fn run(
        settings: &ExportSettings,
        stage: &mut Stage,
        live: &VisualTree,
        state: &CompositionState,
        rasterizer: &dyn Rasterizer,
        sink: &mut dyn DownloadSink,
    ) -> Result<ExportReceipt, ExportError> {
        let width = settings.target_width(state.orientation());

        let mut clone = live.clone_structure();
        clone.width_px = width as f32;
        let copied = live.copy_bitmaps_into(&mut clone);
        tracing::debug!(copied, "copied bitmap surfaces into clone");

        let container = stage.mount(clone);
        let settle = settings.settle_delay();
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let height = container.tree().height_px().round().max(1.0) as u32;
        let image = rasterizer.rasterize(container.tree(), width, height)?;
        drop(container);

        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let filename = export_filename(&settings.filename_prefix, &state.metadata().title);
        let composition_hash = composition_fingerprint(state)?;
        let location = sink.deliver(&filename, &png)?;

        Ok(ExportReceipt {
            id: Uuid::new_v4().to_string(),
            filename,
            location,
            size: [width, height],
            created_at: Utc::now(),
            png_sha256: sha256_hex(&png),
            composition_hash,
        })
    }
}

/// Families tried, in order, for the `sans-serif` text on the card.
const PREFERRED_SANS: [&str; 6] = [
    "Noto Sans Arabic",
    "Noto Sans",
    "DejaVu Sans",
    "Liberation Sans",
    "Arial",
    "Tahoma",
];

/// Renders the tree as SVG and rasterizes it with resvg.
pub struct SvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl SvgRasterizer {
    pub fn new() -> Self {
        Self::with_fonts(None)
    }

    /// System fonts plus every font file in `dir`.
    pub fn with_font_dir(dir: &Path) -> Self {
        Self::with_fonts(Some(dir))
    }

    fn with_fonts(dir: Option<&Path>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        if let Some(dir) = dir {
            db.load_fonts_dir(dir);
        }

        match loaded_sans_family(&db) {
            Some(family) => {
                tracing::debug!(%family, faces = db.len(), "sans-serif family selected");
                db.set_sans_serif_family(family);
            }
            None => tracing::warn!("no fonts loaded, card text will not render"),
        }
        Self { fontdb: Arc::new(db) }
    }

    /// Number of font faces available to text nodes.
    pub fn face_count(&self) -> usize {
        self.fontdb.len()
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

/// A preferred sans family that is actually loaded, else the first family
/// of any loaded face.
fn loaded_sans_family(db: &usvg::fontdb::Database) -> Option<String> {
    let loaded = |name: &str| {
        db.faces()
            .any(|f| f.families.iter().any(|(family, _)| family == name))
    };
    PREFERRED_SANS
        .iter()
        .find(|name| loaded(name))
        .map(|name| name.to_string())
        .or_else(|| {
            db.faces()
                .find_map(|f| f.families.first().map(|(family, _)| family.clone()))
        })
}

/// Resolve the requested families, then the generic ones, then any loaded
/// face, so text is never dropped for want of a named font.
fn font_resolver() -> usvg::FontResolver<'static> {
    usvg::FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families: Vec<usvg::fontdb::Family<'_>> = font
                .families()
                .iter()
                .map(|family| match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(name) => usvg::fontdb::Family::Name(name),
                })
                .collect();
            families.push(usvg::fontdb::Family::SansSerif);
            families.push(usvg::fontdb::Family::Serif);
            families.push(usvg::fontdb::Family::Monospace);

            let stretch = match font.stretch() {
                usvg::FontStretch::UltraCondensed => usvg::fontdb::Stretch::UltraCondensed,
                usvg::FontStretch::ExtraCondensed => usvg::fontdb::Stretch::ExtraCondensed,
                usvg::FontStretch::Condensed => usvg::fontdb::Stretch::Condensed,
                usvg::FontStretch::SemiCondensed => usvg::fontdb::Stretch::SemiCondensed,
                usvg::FontStretch::Normal => usvg::fontdb::Stretch::Normal,
                usvg::FontStretch::SemiExpanded => usvg::fontdb::Stretch::SemiExpanded,
                usvg::FontStretch::Expanded => usvg::fontdb::Stretch::Expanded,
                usvg::FontStretch::ExtraExpanded => usvg::fontdb::Stretch::ExtraExpanded,
                usvg::FontStretch::UltraExpanded => usvg::fontdb::Stretch::UltraExpanded,
            };
            let style = match font.style() {
                usvg::FontStyle::Normal => usvg::fontdb::Style::Normal,
                usvg::FontStyle::Italic => usvg::fontdb::Style::Italic,
                usvg::FontStyle::Oblique => usvg::fontdb::Style::Oblique,
            };

            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch,
                style,
            };
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: usvg::FontResolver::default_fallback_selector(),
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(&self, tree: &VisualTree, width: u32, height: u32) -> Result<RgbaImage, ExportError> {
        let svg = render_svg(tree, width, height)?;
        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            font_resolver: font_resolver(),
            ..Default::default()
        };
        let parsed = usvg::Tree::from_str(&svg, &opts)
            .map_err(|e| ExportError::Rasterize(format!("svg parse: {e}")))?;

        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| ExportError::Rasterize(format!("cannot allocate {width}x{height} pixmap")))?;
        resvg::render(&parsed, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        let mut out = RgbaImage::new(width, height);
        for (dst, px) in out.pixels_mut().zip(pixmap.pixels()) {
            let c = px.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(out)
    }
}

/// SVG document for `tree` resolved at `width` x `height` pixels.
pub fn render_svg(tree: &VisualTree, width: u32, height: u32) -> Result<String, ExportError> {
    let (cw, ch) = (width as f32, height as f32);
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    svg.push_str(&format!(
        r#"<rect width="{width}" height="{height}" fill="{CARD_BACKGROUND}"/>"#
    ));

    for node in tree.paint_order() {
        let (x, y, w, h) = (node.rect.x * cw, node.rect.y * ch, node.rect.w * cw, node.rect.h * ch);
        let scaled = (node.scale - 1.0).abs() > f32::EPSILON;
        if scaled {
            svg.push_str(&format!(
                r#"<g transform="translate({x} {y}) scale({s}) translate({nx} {ny})">"#,
                s = node.scale,
                nx = -x,
                ny = -y
            ));
        }

        match &node.content {
            NodeContent::Surface(surface) => {
                if let Some(pixels) = surface.pixels() {
                    push_image(&mut svg, pixels, x, y, w, h)?;
                }
            }
            NodeContent::Image(img) => push_image(&mut svg, img, x, y, w, h)?,
            NodeContent::Placeholder => {
                svg.push_str(&format!(
                    r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="12" fill="{GLYPH_FILL}"/>"#
                ));
            }
            NodeContent::Text { text, font_size, bold } => {
                let font = font_size * cw;
                let weight = if *bold { "bold" } else { "normal" };
                for (i, line) in wrap_lines(text, w, font).iter().enumerate() {
                    if line.is_empty() {
                        continue;
                    }
                    let baseline = y + font * (i as f32 * LINE_HEIGHT + 1.0);
                    svg.push_str(&format!(
                        r#"<text x="{right}" y="{baseline}" font-family="sans-serif" font-size="{font}" font-weight="{weight}" fill="{TEXT_COLOR}" text-anchor="end" direction="rtl">{body}</text>"#,
                        right = x + w,
                        body = xml_escape(line)
                    ));
                }
            }
            NodeContent::Icons(icons) => {
                let side = h.min(w);
                let gap = side * 0.1;
                for (i, icon) in icons.iter().enumerate() {
                    let ix = x + w - (i as f32 + 1.0) * (side + gap) + gap;
                    match icon {
                        ResolvedIcon::Image { image, .. } => push_image(&mut svg, image, ix, y, side, side)?,
                        ResolvedIcon::Glyph(id) => {
                            svg.push_str(&format!(
                                r#"<rect x="{ix}" y="{y}" width="{side}" height="{side}" rx="{r}" fill="{GLYPH_FILL}"/><text x="{cx}" y="{cy}" font-family="sans-serif" font-size="{fs}" fill="{TEXT_COLOR}" text-anchor="middle">{body}</text>"#,
                                r = side * 0.15,
                                cx = ix + side / 2.0,
                                cy = y + side * 0.6,
                                fs = side * 0.28,
                                body = xml_escape(id)
                            ));
                        }
                    }
                }
            }
        }

        if scaled {
            svg.push_str("</g>");
        }
    }

    svg.push_str("</svg>");
    Ok(svg)
}

fn push_image(svg: &mut String, img: &RgbaImage, x: f32, y: f32, w: f32, h: f32) -> Result<(), ExportError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    svg.push_str(&format!(
        r#"<image x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="xMidYMid slice" href="{href}"/>"#,
        href = encode_data_uri("image/png", &png)
    ));
    Ok(())
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
