//! Visual Tree - The Renderable Card
//!
//! Nodes are placed in canvas-relative units, so the same tree resolves to
//! any container width. Drawn bitmap surfaces are not part of the structure:
//! `clone_structure` leaves them empty and `copy_bitmaps_into` refills them.

use base64::Engine;
use image::{imageops, RgbaImage};
use thiserror::Error;

use crate::config::DesignSettings;
use crate::drag::DragController;
use crate::layout::{aspect_ratio, default_box, resolve_icon, CardElement, CardView, IconSource, Rect, ResolvedIcon};
use crate::proxy::{ProxyClient, ProxyError, ProxyKind};
use crate::state::{CompositionState, OverlayElement};

pub const CLASSIFICATION_LABEL: &str = "تصنيف المحتوى";
/// Blur radius of the poster background, in surface pixels.
pub const BACKGROUND_BLUR_SIGMA: f32 = 20.0;
/// Background surfaces are drawn slightly larger than their box.
pub const BACKGROUND_OVERSAMPLE: f32 = 1.2;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("No image reference")]
    EmptyRef,

    #[error("Malformed data URI")]
    DataUri,

    #[error("Image fetch failed: {0}")]
    Fetch(#[from] ProxyError),

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// A drawn bitmap canvas.
#[derive(Debug)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pixels: Option<RgbaImage>,
}

impl Surface {
    pub fn new(pixels: Option<RgbaImage>) -> Self {
        let (width, height) = pixels.as_ref().map(|p| p.dimensions()).unwrap_or((0, 0));
        Self { width, height, pixels }
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref()
    }
}

#[derive(Debug)]
pub enum NodeContent {
    Surface(Surface),
    Image(RgbaImage),
    /// Empty poster slot; clicking it opens the file picker.
    Placeholder,
    Text { text: String, font_size: f32, bold: bool },
    Icons(Vec<ResolvedIcon>),
}

impl NodeContent {
    fn clone_structure(&self) -> NodeContent {
        match self {
            NodeContent::Surface(s) => NodeContent::Surface(Surface {
                width: s.width,
                height: s.height,
                pixels: None,
            }),
            NodeContent::Image(img) => NodeContent::Image(img.clone()),
            NodeContent::Placeholder => NodeContent::Placeholder,
            NodeContent::Text { text, font_size, bold } => NodeContent::Text {
                text: text.clone(),
                font_size: *font_size,
                bold: *bold,
            },
            NodeContent::Icons(icons) => NodeContent::Icons(icons.clone()),
        }
    }
}

#[derive(Debug)]
pub struct VisualNode {
    pub element: CardElement,
    pub rect: Rect,
    pub scale: f32,
    pub z_index: i32,
    /// Font sizes are fractions of the container width.
    pub content: NodeContent,
}

#[derive(Debug)]
pub struct VisualTree {
    /// Container width the canvas units resolve against.
    pub width_px: f32,
    /// Height over width.
    pub aspect: f32,
    nodes: Vec<VisualNode>,
}

impl VisualTree {
    /// A tree with no nodes.
    pub fn empty(width_px: f32, aspect: f32) -> Self {
        Self { width_px, aspect, nodes: vec![] }
    }

    pub fn height_px(&self) -> f32 {
        self.width_px * self.aspect
    }

    pub fn nodes(&self) -> &[VisualNode] {
        &self.nodes
    }

    pub fn node(&self, element: CardElement) -> Option<&VisualNode> {
        self.nodes.iter().find(|n| n.element == element)
    }

    /// Nodes in paint order (z-index, then insertion order).
    pub fn paint_order(&self) -> Vec<&VisualNode> {
        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.z_index);
        nodes
    }

    /// Copy of the tree without drawn bitmap contents.
    pub fn clone_structure(&self) -> VisualTree {
        VisualTree {
            width_px: self.width_px,
            aspect: self.aspect,
            nodes: self
                .nodes
                .iter()
                .map(|n| VisualNode {
                    element: n.element,
                    rect: n.rect,
                    scale: n.scale,
                    z_index: n.z_index,
                    content: n.content.clone_structure(),
                })
                .collect(),
        }
    }

    /// Re-copy every drawn surface into the matching node of `clone`.
    /// Returns the number of surfaces copied.
    pub fn copy_bitmaps_into(&self, clone: &mut VisualTree) -> usize {
        let mut copied = 0;
        for source in &self.nodes {
            let NodeContent::Surface(src) = &source.content else {
                continue;
            };
            let Some(pixels) = src.pixels() else {
                continue;
            };
            let target = clone.nodes.iter_mut().find(|n| n.element == source.element);
            if let Some(VisualNode { content: NodeContent::Surface(dst), .. }) = target {
                dst.pixels = Some(pixels.clone());
                copied += 1;
            }
        }
        copied
    }
}

/// Decoded images the tree draws from.
pub struct SceneAssets<'a> {
    pub icons: &'a dyn IconSource,
    pub poster: Option<&'a RgbaImage>,
    pub background: Option<&'a RgbaImage>,
}

/// Build the visual tree for the current state at `width_px`.
pub fn build_tree(
    state: &CompositionState,
    view: &CardView,
    design: &DesignSettings,
    drag: &DragController,
    assets: &SceneAssets<'_>,
    width_px: f32,
) -> VisualTree {
    let orientation = state.orientation();
    let sizes = design.sizes(orientation);
    let metadata = state.metadata();

    let node = |element: CardElement, content: NodeContent| VisualNode {
        element,
        rect: default_box(element, orientation),
        scale: 1.0,
        z_index: 0,
        content,
    };
    let text = |text: &str, size_pct: f32, bold: bool| NodeContent::Text {
        text: text.to_string(),
        font_size: size_pct / 100.0,
        bold,
    };

    let stickers = view
        .stickers
        .iter()
        .map(|s| resolve_icon(assets.icons, &s.icon_key, Some(s.fallback_icon_key.as_str()), s.category_id))
        .collect();
    let badges = view
        .badges
        .iter()
        .map(|b| resolve_icon(assets.icons, &b.icon_key, None, b.category_id))
        .collect();
    let poster = match assets.poster {
        Some(img) => NodeContent::Image(img.clone()),
        None => NodeContent::Placeholder,
    };

    let mut nodes = vec![
        node(CardElement::Background, NodeContent::Surface(Surface::new(assets.background.cloned()))),
        node(CardElement::Poster, poster),
        node(CardElement::ClassificationLabel, text(CLASSIFICATION_LABEL, sizes.genre_size * 0.9, true)),
        node(CardElement::Title, text(&metadata.title, sizes.title_size * view.title_size.factor(), true)),
        node(CardElement::Year, text(&metadata.year, sizes.genre_size, false)),
        node(CardElement::Genre, text(&metadata.genre, sizes.genre_size, false)),
        node(CardElement::Synopsis, text(&metadata.synopsis, sizes.synopsis_size * view.synopsis_tier.factor(), false)),
        node(CardElement::Stickers, NodeContent::Icons(stickers)),
        node(CardElement::Badges, NodeContent::Icons(badges)),
        node(CardElement::Comment, text(&metadata.comment, sizes.genre_size * 0.8, false)),
    ];

    for element in OverlayElement::ALL {
        let Some(n) = nodes.iter_mut().find(|n| n.element == CardElement::from(element)) else {
            continue;
        };
        if let Some(o) = state.manual_override(element) {
            n.rect.x = o.x;
            n.rect.y = o.y;
            n.scale = o.scale;
        }
        if let Some(z) = drag.z_index(element) {
            n.z_index = z;
        }
    }

    VisualTree { width_px, aspect: aspect_ratio(orientation), nodes }
}

/// Load a poster reference: a `data:` URI or a remote URL routed through
/// the image proxy.
pub fn load_poster(poster_ref: &str, proxy: &dyn ProxyClient) -> Result<RgbaImage, AssetError> {
    let bytes = if poster_ref.is_empty() {
        return Err(AssetError::EmptyRef);
    } else if poster_ref.starts_with("data:") {
        decode_data_uri(poster_ref)?
    } else {
        proxy.fetch(ProxyKind::ImageProxy, poster_ref)?
    };
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{payload}")
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, AssetError> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(AssetError::DataUri)?;
    if !header.ends_with(";base64") {
        return Err(AssetError::DataUri);
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| AssetError::DataUri)
}

/// Cover-scale `poster` onto a `width` x `height` surface and blur it.
pub fn render_blurred_background(poster: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let width = ((width as f32) * BACKGROUND_OVERSAMPLE).round().max(1.0) as u32;
    let height = ((height as f32) * BACKGROUND_OVERSAMPLE).round().max(1.0) as u32;

    let (pw, ph) = poster.dimensions();
    let scale = (width as f32 / pw.max(1) as f32).max(height as f32 / ph.max(1) as f32);
    let sw = ((pw as f32) * scale).ceil().max(width as f32) as u32;
    let sh = ((ph as f32) * scale).ceil().max(height as f32) as u32;

    let scaled = imageops::resize(poster, sw, sh, imageops::FilterType::Triangle);
    let x = (sw - width) / 2;
    let y = (sh - height) / 2;
    let cropped = imageops::crop_imm(&scaled, x, y, width, height).to_image();
    imageops::blur(&cropped, BACKGROUND_BLUR_SIGMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_view, NoIcons};
    use crate::schema::ContentType;
    use image::Rgba;

    fn tree_with_background(state: &CompositionState) -> VisualTree {
        let design = DesignSettings::default();
        let view = compute_view(state, &design, 800.0);
        let background = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let assets = SceneAssets { icons: &NoIcons, poster: None, background: Some(&background) };
        build_tree(state, &view, &design, &DragController::new(800.0), &assets, 800.0)
    }

    #[test]
    fn test_clone_drops_and_copy_restores_bitmaps() {
        let state = CompositionState::new(ContentType::Movie);
        let tree = tree_with_background(&state);

        let mut clone = tree.clone_structure();
        let surface = |t: &VisualTree| match &t.node(CardElement::Background).unwrap().content {
            NodeContent::Surface(s) => s.pixels().cloned(),
            _ => None,
        };
        assert!(surface(&clone).is_none());
        assert_eq!(clone.nodes().len(), tree.nodes().len());

        assert_eq!(tree.copy_bitmaps_into(&mut clone), 1);
        assert_eq!(surface(&clone), surface(&tree));
    }

    #[test]
    fn test_overrides_move_overlay_nodes() {
        let mut state = CompositionState::default();
        state.set_manual_override(
            OverlayElement::Title,
            crate::state::ManualOverride { x: 0.5, y: 0.5, scale: 2.0 },
        );
        let tree = tree_with_background(&state);
        let title = tree.node(CardElement::Title).unwrap();
        assert_eq!((title.rect.x, title.rect.y, title.scale), (0.5, 0.5, 2.0));
        assert!(matches!(tree.node(CardElement::Poster).unwrap().content, NodeContent::Placeholder));
    }

    #[test]
    fn test_data_uri_round_trip() {
        let uri = encode_data_uri("image/png", b"\x89PNG");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap(), b"\x89PNG");
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn test_blurred_background_covers_box() {
        let poster = RgbaImage::from_pixel(30, 60, Rgba([200, 0, 0, 255]));
        let bg = render_blurred_background(&poster, 100, 50);
        assert_eq!(bg.dimensions(), (120, 60));
        assert_eq!(bg.get_pixel(60, 30)[1], 0);
    }
}
