//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::cell::Cell;

use image::RgbaImage;
use serde_json::json;

use cardforge_core::config::Settings;
use cardforge_core::drag::Point;
use cardforge_core::export::{DownloadSink, ExportError, Rasterizer};
use cardforge_core::hashing::composition_fingerprint;
use cardforge_core::layout::{CardElement, NoIcons};
use cardforge_core::provider::TRANSLATING;
use cardforge_core::visual::VisualTree;
use cardforge_core::{
    Composer, ContentType, ExportStatus, MemoryProxy, MetadataField, Orientation,
    OverlayElement, PosterClick, ProxyKind, RatingLevel, ScaleTier, SvgRasterizer,
    SynopsisSizeMode,
};

const INCEPTION_OVERVIEW: &str = "A thief who steals corporate secrets through dream-sharing.";
const INCEPTION_TRANSLATED: &str = "لص يسرق أسرار الشركات عبر مشاركة الأحلام.";
const INCEPTION_POSTER: &str = "https://image.tmdb.org/t/p/w500/inception.jpg";

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.export.settle_delay_ms = 0;
    settings
}

fn composer_with(proxy: MemoryProxy) -> Composer {
    Composer::new(test_settings(), Box::new(proxy), Box::new(NoIcons))
}

fn inception_proxy() -> MemoryProxy {
    MemoryProxy::new()
        .with_json(
            ProxyKind::Movie,
            "Inception",
            json!({
                "results": [{
                    "title": "Inception",
                    "release_date": "2010-07-15",
                    "poster_path": "/inception.jpg",
                    "genre_ids": [28, 878],
                    "overview": INCEPTION_OVERVIEW,
                    "original_language": "en"
                }]
            }),
        )
        .with_json(
            ProxyKind::Translate,
            INCEPTION_OVERVIEW,
            json!({
                "responseStatus": 200,
                "responseData": { "translatedText": INCEPTION_TRANSLATED }
            }),
        )
}

/// Records the tree size it was asked for and returns a blank image.
struct BlankRasterizer {
    seen_width: Cell<f32>,
}

impl Rasterizer for BlankRasterizer {
    fn rasterize(&self, tree: &VisualTree, width: u32, height: u32) -> Result<RgbaImage, ExportError> {
        self.seen_width.set(tree.width_px);
        Ok(RgbaImage::new(width, height))
    }
}

struct FailingRasterizer;

impl Rasterizer for FailingRasterizer {
    fn rasterize(&self, _: &VisualTree, _: u32, _: u32) -> Result<RgbaImage, ExportError> {
        Err(ExportError::Rasterize("canvas tainted".to_string()))
    }
}

#[derive(Default)]
struct MemorySink {
    files: Vec<(String, Vec<u8>)>,
}

impl DownloadSink for MemorySink {
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<String, ExportError> {
        self.files.push((filename.to_string(), bytes.to_vec()));
        Ok(format!("memory://{filename}"))
    }
}

#[test]
fn invariant_none_ratings_produce_no_stickers() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Game);

    let view = composer.set_rating("lootbox", RatingLevel::None).unwrap();
    assert!(view.stickers.is_empty());
    assert!(composer.state().ratings().is_empty());
}

#[test]
fn invariant_sticker_order_follows_schema() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Game);

    composer.set_rating("p2w", RatingLevel::Mild).unwrap();
    composer.set_rating("gore", RatingLevel::Severe).unwrap();
    let view = composer.set_rating("kufr", RatingLevel::Heavy).unwrap();

    let ids: Vec<_> = view.stickers.iter().map(|s| s.category_id).collect();
    assert_eq!(ids, vec!["kufr", "gore", "p2w"]);
}

#[test]
fn invariant_type_switch_reset_is_idempotent() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_rating("sex", RatingLevel::Mild).unwrap();
    composer.toggle_badge("nomusic").unwrap();
    composer.edit(MetadataField::Title, "Something");

    composer.set_content_type(ContentType::Book);
    let once = composer.state().clone();
    composer.set_content_type(ContentType::Book);

    assert!(composer.state().ratings().is_empty());
    assert!(composer.state().badges().values().all(|on| !on));
    assert_eq!(composer.state().metadata(), once.metadata());
    assert_eq!(
        composer_fingerprint(&composer),
        composition_fingerprint(&once).unwrap()
    );
}

fn composer_fingerprint(composer: &Composer) -> String {
    composition_fingerprint(composer.state()).unwrap()
}

#[test]
fn invariant_auto_fit_is_monotonic() {
    let mut composer = composer_with(MemoryProxy::new());
    let mut previous = ScaleTier::Base;
    for words in 1..=60 {
        let text = vec!["story"; words].join(" ");
        let tier = composer.edit(MetadataField::Synopsis, &text).synopsis_tier;
        assert!(tier >= previous, "{words} words fell back from {previous:?} to {tier:?}");
        previous = tier;
    }
    assert!(previous > ScaleTier::Base);
}

#[test]
fn invariant_manual_size_modes_ignore_length() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_synopsis_size_mode(SynopsisSizeMode::Small);
    for words in [1, 30, 60] {
        let text = vec!["story"; words].join(" ");
        assert_eq!(composer.edit(MetadataField::Synopsis, &text).synopsis_tier, ScaleTier::Heavy);
    }
}

#[test]
fn invariant_drag_disable_clears_overrides_and_listeners() {
    let mut composer = composer_with(MemoryProxy::new());
    assert!(composer.enable_drag());

    assert!(composer.pointer_down(OverlayElement::Title, Point::new(10.0, 10.0)));
    composer.pointer_move(Point::new(90.0, 40.0));
    assert!(composer.animation_frame());
    composer.pointer_up();
    composer.wheel(OverlayElement::StickersGrid, -1.0);
    assert_eq!(composer.state().manual_overrides().len(), 2);

    let tree = composer.visual_tree();
    assert_eq!(tree.node(CardElement::Title).unwrap().z_index, 1000);

    composer.disable_drag();
    assert!(composer.state().manual_overrides().is_empty());
    for element in OverlayElement::ALL {
        assert!(!composer.drag().has_listeners(element));
    }
    assert_eq!(composer.visual_tree().node(CardElement::Title).unwrap().z_index, 0);
}

#[test]
fn invariant_vertical_switch_ends_drag_mode() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.enable_drag();
    composer.wheel(OverlayElement::Title, -1.0);

    composer.set_orientation(Orientation::Vertical);
    assert!(!composer.drag().is_enabled());
    assert!(composer.state().manual_overrides().is_empty());
    assert!(!composer.enable_drag());
}

#[test]
fn invariant_export_container_removed_on_success() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.edit(MetadataField::Title, "Inception");
    let rasterizer = BlankRasterizer { seen_width: Cell::new(0.0) };
    let mut sink = MemorySink::default();

    let receipt = composer.export(&rasterizer, &mut sink).unwrap();

    assert_eq!(composer.offscreen_containers(), 0);
    assert_eq!(rasterizer.seen_width.get(), 1920.0);
    assert_eq!(receipt.size, [1920, 1080]);
    assert_eq!(receipt.filename, "CCCC-Inception.png");
    assert_eq!(sink.files.len(), 1);
    assert_eq!(composer.export_status(), &ExportStatus::Idle);
}

#[test]
fn invariant_export_container_removed_on_failure() {
    let mut composer = composer_with(MemoryProxy::new());
    let mut sink = MemorySink::default();

    let result = composer.export(&FailingRasterizer, &mut sink);

    assert!(result.is_err());
    assert_eq!(composer.offscreen_containers(), 0);
    assert!(sink.files.is_empty());
    assert_eq!(composer.export_status().label(), "ERROR");
}

#[test]
fn invariant_vertical_export_width() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_orientation(Orientation::Vertical);
    let rasterizer = BlankRasterizer { seen_width: Cell::new(0.0) };

    let receipt = composer.export(&rasterizer, &mut MemorySink::default()).unwrap();
    assert_eq!(receipt.size, [1200, 1600]);
}

#[test]
fn scenario_inception_hydrates_in_two_steps() {
    let mut composer = composer_with(inception_proxy());
    composer.set_content_type(ContentType::Movie);

    let results = composer.search("Inception");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Inception");

    let mut hydration = composer.select(0).unwrap();
    let md = composer.state().metadata();
    assert_eq!(md.title, "Inception");
    assert_eq!(md.year, "2010");
    assert_eq!(md.poster_ref, INCEPTION_POSTER);
    assert_eq!(md.synopsis, TRANSLATING);

    assert_eq!(composer.pump(&mut hydration), Some(true));
    assert_eq!(composer.state().metadata().synopsis, INCEPTION_TRANSLATED);
    assert_eq!(composer.pump(&mut hydration), None);

    assert_eq!(composer.poster_click(), PosterClick::Navigate(INCEPTION_POSTER.to_string()));
}

#[test]
fn scenario_type_switch_discards_late_translation() {
    let mut composer = composer_with(inception_proxy());
    composer.set_content_type(ContentType::Movie);
    composer.search("Inception");
    let mut hydration = composer.select(0).unwrap();

    composer.set_content_type(ContentType::Anime);
    assert_eq!(composer.pump(&mut hydration), Some(false));
    assert_eq!(composer.state().metadata().title, "ANIME TITLE");
    assert!(composer.state().metadata().synopsis.is_empty());
}

#[test]
fn scenario_select_keeps_comment() {
    let mut composer = composer_with(inception_proxy());
    composer.set_content_type(ContentType::Movie);
    composer.edit(MetadataField::Comment, "my review");

    composer.search("Inception");
    let hydration = composer.select(0).unwrap();
    assert_eq!(composer.state().metadata().comment, "my review");

    composer.finish(hydration);
    assert_eq!(composer.state().metadata().comment, "my review");
}

#[test]
fn scenario_late_translation_keeps_title_edit() {
    let mut composer = composer_with(inception_proxy());
    composer.set_content_type(ContentType::Movie);
    composer.search("Inception");
    let mut hydration = composer.select(0).unwrap();

    composer.edit(MetadataField::Title, "Inception (2010)");
    composer.edit(MetadataField::Genre, "خيال علمي");
    assert_eq!(composer.pump(&mut hydration), Some(true));

    let md = composer.state().metadata();
    assert_eq!(md.title, "Inception (2010)");
    assert_eq!(md.genre, "خيال علمي");
    assert_eq!(md.year, "2010");
    assert_eq!(md.synopsis, INCEPTION_TRANSLATED);
}

/// Count of light pixels inside the node's box. Text is white on a dark card.
fn ink_in(img: &RgbaImage, tree: &VisualTree, element: CardElement) -> usize {
    let rect = tree.node(element).unwrap().rect;
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x0 = (rect.x * w).max(0.0) as u32;
    let y0 = (rect.y * h).max(0.0) as u32;
    let x1 = ((rect.x + rect.w) * w).min(w) as u32;
    let y1 = ((rect.y + rect.h) * h).min(h) as u32;
    (y0..y1)
        .flat_map(|y| (x0..x1).map(move |x| (x, y)))
        .filter(|&(x, y)| img.get_pixel(x, y)[0] > 128)
        .count()
}

#[test]
fn svg_rasterizer_draws_card_text_and_glyph_icons() {
    let rasterizer = SvgRasterizer::new();
    if rasterizer.face_count() == 0 {
        eprintln!("no system fonts installed, skipping text rasterization check");
        return;
    }

    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Movie);
    composer.edit(MetadataField::Title, "Inception");
    composer.edit(MetadataField::Synopsis, INCEPTION_OVERVIEW);
    composer.set_rating("kufr", RatingLevel::Heavy).unwrap();

    let tree = composer.visual_tree();
    let img = rasterizer.rasterize(&tree, 960, 540).unwrap();

    assert!(ink_in(&img, &tree, CardElement::Title) > 0, "title rendered no text");
    assert!(ink_in(&img, &tree, CardElement::Synopsis) > 0, "synopsis rendered no text");
    assert!(ink_in(&img, &tree, CardElement::Stickers) > 0, "glyph icon rendered empty");
}

#[test]
fn scenario_kufr_heavy_then_cleared() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Movie);

    let view = composer.set_rating("kufr", RatingLevel::Heavy).unwrap();
    assert_eq!(view.stickers.len(), 1);
    assert_eq!(view.stickers[0].icon_key, "كفريات2");
    assert_eq!(view.stickers[0].fallback_icon_key, "كفريات");

    let view = composer.set_rating("kufr", RatingLevel::None).unwrap();
    assert!(view.stickers.is_empty());
}

#[test]
fn scenario_repeated_badge_stays_on() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_badge("nomusic", true).unwrap();
    let view = composer.set_badge("nomusic", true).unwrap();

    assert_eq!(view.badges.len(), 1);
    assert_eq!(view.badges[0].icon_key, "موسيقى0");
    assert!(composer.set_badge("kufr", true).is_err());
}

#[test]
fn scenario_game_only_flag_rejected_for_movies() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Movie);
    assert!(composer.set_rating("lootbox", RatingLevel::Mild).is_err());
    assert!(composer.view().stickers.is_empty());
}

#[test]
fn scenario_manual_without_poster_opens_file_picker() {
    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Manual);
    assert_eq!(composer.state().metadata().poster_ref, "");
    assert_eq!(composer.poster_click(), PosterClick::PickFile);
    assert!(composer.search("anything").is_empty());
}

#[test]
fn scenario_uploaded_poster_stays_local() {
    let mut png = Vec::new();
    RgbaImage::from_pixel(4, 6, image::Rgba([200, 10, 10, 255]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let mut composer = composer_with(MemoryProxy::new());
    composer.set_content_type(ContentType::Manual);
    composer.upload_poster(&png, "image/png").unwrap();

    assert!(composer.state().metadata().poster_ref.starts_with("data:image/png;base64,"));
    assert_eq!(composer.poster_click(), PosterClick::PickFile);
    assert!(composer.upload_poster(b"not an image", "image/png").is_err());
}
