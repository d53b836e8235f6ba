//! CardForge Core - Content Classification Card Composer
//!
//! # The Five Laws (Non-Negotiable)
//! 1. State Is Truth: every visible element derives from one composition state
//! 2. The Schema Decides Order: stickers and badges follow category order
//! 3. Stale Metadata Never Lands: a type switch invalidates in-flight hydration
//! 4. Exports Leave No Trace: the off-screen copy is removed on every path
//! 5. Missing Assets Degrade: a broken icon or poster never blocks the card

pub mod schema;
pub mod state;
pub mod proxy;
pub mod translation;
pub mod provider;
pub mod config;
pub mod layout;
pub mod drag;
pub mod visual;
pub mod hashing;
pub mod export;
pub mod composer;

pub use schema::{CategoryDefinition, ContentType, Orientation, RatingLevel};
pub use state::{
    CatalogFields, CompositionState, HydrationUpdate, Metadata, OverlayElement, SynopsisSizeMode,
};
pub use proxy::{HttpProxy, MemoryProxy, ProxyClient, ProxyError, ProxyKind};
pub use provider::{CandidateResult, Hydration, MetadataProvider};
pub use config::Settings;
pub use layout::{CardView, ScaleTier, StickerDescriptor, BadgeDescriptor};
pub use export::{DirectorySink, ExportPipeline, ExportReceipt, ExportStatus, SvgRasterizer};
pub use composer::{Composer, MetadataField, PosterClick};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
