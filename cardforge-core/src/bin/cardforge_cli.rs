//! CardForge CLI - Compose classification cards from the command line
//!
//! Commands: categories, search, compose
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on failure

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use cardforge_core::layout::{DirIconSource, IconSource, NoIcons};
use cardforge_core::schema::{self, ContentType, Orientation, RatingLevel};
use cardforge_core::{
    Composer, DirectorySink, HttpProxy, MetadataField, MetadataProvider, Settings,
    SvgRasterizer, SynopsisSizeMode,
};

#[derive(Parser)]
#[command(name = "cardforge-cli")]
#[command(about = "CardForge CLI - Content Classification Card composer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON settings file
    #[arg(short, long, default_value = "cardforge.json")]
    settings: PathBuf,

    /// Override the proxy endpoint from the settings file
    #[arg(long)]
    proxy_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List content flag and exemption categories
    Categories {
        /// Include game-only categories
        #[arg(long)]
        game: bool,
    },

    /// Search the metadata catalog for a content type
    Search {
        /// Content type (movie, tv, anime, manga, game, book)
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        #[arg(short, long)]
        query: String,
    },

    /// Compose a card and export it as PNG
    Compose {
        /// JSON payload (ComposeRequest)
        #[arg(short, long)]
        payload: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Directory of `<key>.png` sticker and badge icons
        #[arg(long)]
        icons: Option<PathBuf>,

        /// Extra font directory
        #[arg(long)]
        fonts: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ComposeRequest {
    content_type: Option<ContentType>,
    orientation: Orientation,
    /// Search the catalog and hydrate from the `pick`-th result.
    query: Option<String>,
    pick: usize,
    ratings: BTreeMap<String, RatingLevel>,
    badges: Vec<String>,
    synopsis_size: SynopsisSizeMode,
    title: Option<String>,
    year: Option<String>,
    genre: Option<String>,
    synopsis: Option<String>,
    comment: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match Settings::load(&cli.settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load settings: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = cli.proxy_url {
        settings.proxy_url = url;
    }

    match cli.command {
        Commands::Categories { game } => {
            let output = serde_json::json!({
                "contentFlags": schema::list_content_flag_categories(game),
                "exemptions": schema::list_exemption_categories(),
            });
            print_json(&output);
            ExitCode::SUCCESS
        }

        Commands::Search { content_type, query } => {
            let proxy = match HttpProxy::new(&settings.proxy_url) {
                Ok(p) => p,
                Err(e) => return fail(&e.to_string()),
            };
            let results = MetadataProvider::for_content_type(content_type).search(&proxy, &query);
            print_json(&results);
            ExitCode::SUCCESS
        }

        Commands::Compose { payload, out, icons, fonts } => {
            let request: ComposeRequest = match serde_json::from_str(&payload) {
                Ok(r) => r,
                Err(e) => return fail(&format!("Invalid payload: {e}")),
            };
            let proxy = match HttpProxy::new(&settings.proxy_url) {
                Ok(p) => p,
                Err(e) => return fail(&e.to_string()),
            };
            let icons: Box<dyn IconSource> = match icons {
                Some(dir) => Box::new(DirIconSource::new(dir)),
                None => Box::new(NoIcons),
            };
            let rasterizer = match fonts {
                Some(dir) => SvgRasterizer::with_font_dir(&dir),
                None => SvgRasterizer::new(),
            };

            let mut composer = Composer::new(settings, Box::new(proxy), icons);
            if let Err(message) = apply_request(&mut composer, request) {
                return fail(&message);
            }

            let mut sink = DirectorySink::new(out);
            match composer.export(&rasterizer, &mut sink) {
                Ok(receipt) => {
                    print_json(&serde_json::json!({ "success": true, "receipt": receipt }));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    print_json(&serde_json::json!({
                        "success": false,
                        "status": composer.export_status().label(),
                        "error": e.to_string(),
                    }));
                    ExitCode::from(2)
                }
            }
        }
    }
}

fn apply_request(composer: &mut Composer, request: ComposeRequest) -> Result<(), String> {
    if let Some(content_type) = request.content_type {
        composer.set_content_type(content_type);
    }
    composer.set_orientation(request.orientation);
    composer.set_synopsis_size_mode(request.synopsis_size);

    if let Some(query) = request.query.as_deref() {
        if composer.search(query).is_empty() {
            tracing::warn!(query, "no search results, keeping defaults");
        } else if let Some(hydration) = composer.select(request.pick) {
            let applied = composer.finish(hydration);
            tracing::debug!(applied, "hydration finished");
        } else {
            return Err(format!("No result at index {}", request.pick));
        }
    }

    for (id, level) in &request.ratings {
        composer.set_rating(id, *level).map_err(|e| e.to_string())?;
    }
    for id in &request.badges {
        composer.set_badge(id, true).map_err(|e| e.to_string())?;
    }

    let edits = [
        (MetadataField::Title, request.title),
        (MetadataField::Year, request.year),
        (MetadataField::Genre, request.genre),
        (MetadataField::Synopsis, request.synopsis),
        (MetadataField::Comment, request.comment),
    ];
    for (field, text) in edits {
        if let Some(text) = text {
            composer.edit(field, &text);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!(r#"{{"error": "Failed to serialize output: {}"}}"#, e),
    }
}

fn fail(message: &str) -> ExitCode {
    print_json(&serde_json::json!({ "success": false, "error": message }));
    ExitCode::FAILURE
}
