use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::Level;

use wristfit::{Catalog, FileAssetLoader, SessionFactory, TryOnConfig, Viewer};

/// Real-time watch try-on over a recorded camera feed.
#[derive(Debug, Parser)]
#[command(name = "wristfit", version, about)]
struct Args {
    /// Product catalog (JSON array or {"products": [...]})
    #[arg(long)]
    catalog: PathBuf,

    /// Id of the product to try on first
    #[arg(long)]
    product: String,

    /// Image or directory of images played back as the camera
    #[arg(long)]
    video: PathBuf,

    /// JSON-lines hand landmark recording, one detection per frame
    #[arg(long)]
    landmarks: PathBuf,

    /// Directory that relative asset paths resolve against
    /// (defaults to the catalog's directory)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Pipeline configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames between a frame and its landmarks
    #[arg(long, default_value_t = 1)]
    latency: usize,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => TryOnConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TryOnConfig::default(),
    };
    if let Some(width) = args.width {
        config.window.width = width;
    }
    if let Some(height) = args.height {
        config.window.height = height;
    }

    let catalog = Catalog::from_file(&args.catalog)
        .with_context(|| format!("loading catalog {}", args.catalog.display()))?;
    tracing::info!(products = catalog.len(), "catalog loaded");

    let assets = args.assets.clone().unwrap_or_else(|| {
        args.catalog
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let window = config.window.clone();
    let factory = SessionFactory {
        config,
        loader: Arc::new(FileAssetLoader::new(assets)),
        video: args.video,
        landmarks: args.landmarks,
        latency: args.latency,
    };
    let viewer = Viewer::new(factory, catalog, &args.product)
        .with_context(|| format!("selecting product '{}'", args.product))?;

    wristfit::run(window, viewer).context("viewer failed")?;
    Ok(())
}
