//! Composer - The Card Editing Session
//!
//! Owns the composition state and hands it by reference to every component.
//! Each mutator returns the recomputed view, so callers never render from a
//! stale derivation.

use image::RgbaImage;

use crate::config::Settings;
use crate::drag::{DragController, Point};
use crate::export::{DownloadSink, ExportError, ExportPipeline, ExportReceipt, ExportStatus, Rasterizer};
use crate::layout::{aspect_ratio, compute_view, CardView, IconSource};
use crate::provider::{CandidateResult, Hydration, MetadataProvider};
use crate::proxy::ProxyClient;
use crate::schema::{ContentType, Orientation, RatingLevel};
use crate::state::{CompositionState, OverlayElement, StateError, SynopsisSizeMode};
use crate::translation::Translator;
use crate::visual::{
    build_tree, encode_data_uri, load_poster, render_blurred_background, AssetError, SceneAssets,
    VisualTree,
};

/// Default live preview width in pixels.
pub const DEFAULT_PREVIEW_WIDTH: f32 = 960.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Year,
    Genre,
    Synopsis,
    Comment,
}

/// What clicking the poster slot does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PosterClick {
    PickFile,
    Navigate(String),
}

struct LoadedPoster {
    poster_ref: String,
    image: Option<RgbaImage>,
    background: Option<RgbaImage>,
}

pub struct Composer {
    settings: Settings,
    state: CompositionState,
    drag: DragController,
    translator: Translator,
    proxy: Box<dyn ProxyClient>,
    icons: Box<dyn IconSource>,
    preview_width: f32,
    poster: Option<LoadedPoster>,
    exporter: ExportPipeline,
    candidates: Vec<CandidateResult>,
}

impl Composer {
    pub fn new(settings: Settings, proxy: Box<dyn ProxyClient>, icons: Box<dyn IconSource>) -> Self {
        let exporter = ExportPipeline::new(settings.export.clone());
        Self {
            settings,
            state: CompositionState::default(),
            drag: DragController::new(DEFAULT_PREVIEW_WIDTH),
            translator: Translator::new(),
            proxy,
            icons,
            preview_width: DEFAULT_PREVIEW_WIDTH,
            poster: None,
            exporter,
            candidates: vec![],
        }
    }

    pub fn state(&self) -> &CompositionState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn candidates(&self) -> &[CandidateResult] {
        &self.candidates
    }

    pub fn export_status(&self) -> &ExportStatus {
        self.exporter.status()
    }

    pub fn offscreen_containers(&self) -> usize {
        self.exporter.stage().offscreen_count()
    }

    pub fn view(&self) -> CardView {
        compute_view(&self.state, &self.settings.design, self.preview_width)
    }

    /// Destructive type switch: ratings, badges, metadata and search results
    /// are all dropped.
    pub fn set_content_type(&mut self, content_type: ContentType) -> CardView {
        self.state.set_content_type(content_type);
        self.candidates.clear();
        self.refresh_poster();
        self.view()
    }

    pub fn set_orientation(&mut self, orientation: Orientation) -> CardView {
        if orientation == Orientation::Vertical {
            self.drag.disable(&mut self.state);
        }
        self.state.set_orientation(orientation);
        self.redraw_background();
        self.view()
    }

    pub fn set_rating(&mut self, id: &str, level: RatingLevel) -> Result<CardView, StateError> {
        self.state.set_rating(id, level)?;
        Ok(self.view())
    }

    pub fn toggle_badge(&mut self, id: &str) -> Result<CardView, StateError> {
        self.state.toggle_badge(id)?;
        Ok(self.view())
    }

    pub fn set_badge(&mut self, id: &str, on: bool) -> Result<CardView, StateError> {
        self.state.set_badge(id, on)?;
        Ok(self.view())
    }

    pub fn set_synopsis_size_mode(&mut self, mode: SynopsisSizeMode) -> CardView {
        self.state.set_synopsis_size_mode(mode);
        self.view()
    }

    /// In-place text edit. Allowed in every orientation and drag mode.
    pub fn edit(&mut self, field: MetadataField, text: &str) -> CardView {
        match field {
            MetadataField::Title => self.state.set_title(text),
            MetadataField::Year => self.state.set_year(text),
            MetadataField::Genre => self.state.set_genre(text),
            MetadataField::Synopsis => self.state.set_synopsis(text),
            MetadataField::Comment => self.state.set_comment(text),
        }
        self.view()
    }

    /// Live container measurement changed.
    pub fn resize(&mut self, preview_width: f32) -> CardView {
        self.preview_width = preview_width;
        self.drag.set_viewport_width(preview_width);
        self.redraw_background();
        self.view()
    }

    pub fn search(&mut self, query: &str) -> &[CandidateResult] {
        let provider = MetadataProvider::for_content_type(self.state.content_type());
        self.candidates = provider.search(self.proxy.as_ref(), query);
        &self.candidates
    }

    /// Select a search result. Its catalog fields are applied immediately and
    /// the comment is kept; the returned hydration carries the slower stages.
    pub fn select(&mut self, index: usize) -> Option<Hydration> {
        let candidate = self.candidates.get(index)?;
        let provider = MetadataProvider::for_content_type(self.state.content_type());
        let hydration = provider.hydrate(candidate, self.state.generation());

        self.state.apply_hydration(hydration.generation(), hydration.initial());
        self.candidates.clear();
        self.refresh_poster();
        Some(hydration)
    }

    /// Run one pending hydration stage. `Some(false)` means the update
    /// arrived after a type switch and was discarded.
    pub fn pump(&mut self, hydration: &mut Hydration) -> Option<bool> {
        let update = hydration.advance(self.proxy.as_ref(), &mut self.translator)?;
        let applied = self.state.apply_hydration(hydration.generation(), update);
        if applied {
            self.refresh_poster();
        }
        Some(applied)
    }

    /// Drive a hydration to completion. Returns how many updates applied.
    pub fn finish(&mut self, mut hydration: Hydration) -> usize {
        let mut applied = 0;
        while let Some(ok) = self.pump(&mut hydration) {
            if ok {
                applied += 1;
            }
        }
        applied
    }

    /// Use an uploaded image as the poster.
    pub fn upload_poster(&mut self, bytes: &[u8], mime: &str) -> Result<CardView, AssetError> {
        image::load_from_memory(bytes)?;
        self.state.set_poster_ref(encode_data_uri(mime, bytes));
        self.refresh_poster();
        Ok(self.view())
    }

    pub fn poster_click(&self) -> PosterClick {
        let poster_ref = &self.state.metadata().poster_ref;
        let remote = !poster_ref.is_empty() && !poster_ref.starts_with("data:");
        if self.state.content_type() == ContentType::Manual || !remote {
            PosterClick::PickFile
        } else {
            PosterClick::Navigate(poster_ref.clone())
        }
    }

    pub fn enable_drag(&mut self) -> bool {
        self.drag.enable(&self.state)
    }

    pub fn disable_drag(&mut self) {
        self.drag.disable(&mut self.state);
    }

    pub fn pointer_down(&mut self, element: OverlayElement, at: Point) -> bool {
        self.drag.pointer_down(&self.state, element, at)
    }

    pub fn pointer_move(&mut self, at: Point) {
        self.drag.pointer_move(at);
    }

    pub fn animation_frame(&mut self) -> bool {
        self.drag.animation_frame(&mut self.state)
    }

    pub fn pointer_up(&mut self) {
        self.drag.pointer_up();
    }

    pub fn wheel(&mut self, element: OverlayElement, delta_y: f32) -> Option<f32> {
        self.drag.wheel(&mut self.state, element, delta_y)
    }

    pub fn visual_tree(&self) -> VisualTree {
        let assets = SceneAssets {
            icons: self.icons.as_ref(),
            poster: self.poster.as_ref().and_then(|p| p.image.as_ref()),
            background: self.poster.as_ref().and_then(|p| p.background.as_ref()),
        };
        build_tree(
            &self.state,
            &self.view(),
            &self.settings.design,
            &self.drag,
            &assets,
            self.preview_width,
        )
    }

    pub fn export(
        &mut self,
        rasterizer: &dyn Rasterizer,
        sink: &mut dyn DownloadSink,
    ) -> Result<ExportReceipt, ExportError> {
        let live = self.visual_tree();
        self.exporter.export(&live, &self.state, rasterizer, sink)
    }

    fn refresh_poster(&mut self) {
        let poster_ref = self.state.metadata().poster_ref.clone();
        if self.poster.as_ref().is_some_and(|p| p.poster_ref == poster_ref) {
            return;
        }
        if poster_ref.is_empty() {
            self.poster = None;
            return;
        }

        let image = match load_poster(&poster_ref, self.proxy.as_ref()) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(poster = %poster_ref, error = %e, "poster unavailable, using placeholder");
                None
            }
        };
        self.poster = Some(LoadedPoster { poster_ref, image, background: None });
        self.redraw_background();
    }

    fn redraw_background(&mut self) {
        let width = self.preview_width.max(1.0);
        let height = width * aspect_ratio(self.state.orientation());
        if let Some(poster) = self.poster.as_mut() {
            poster.background = poster
                .image
                .as_ref()
                .map(|img| render_blurred_background(img, width as u32, height as u32));
        }
    }
}
