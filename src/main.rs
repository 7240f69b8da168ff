//! Binary entrypoint for the tattoo preview.
//!
//! Delegates all logic to the library crate.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tattoo_preview::config::{BackendKind, Configuration};
use tattoo_preview::{ExportMode, PreviewEngine, ViewerOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Cpu,
    Gpu,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpu => BackendKind::Cpu,
            BackendArg::Gpu => BackendKind::Gpu,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tattoo-preview",
    version,
    about = "Preview tattoo artwork on a photo"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Base photo path, file:// URL or data: URI
    #[arg(long, value_name = "URL")]
    photo: String,
    /// Tattoo artwork path, file:// URL or data: URI
    #[arg(long, value_name = "URL")]
    art: Option<String>,
    /// Render headless and write a PNG instead of opening a window
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,
    /// Export the artwork alone instead of the composite
    #[arg(long, requires = "export")]
    artwork_only: bool,
    /// Override render.backend from the config
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tattoo_preview={level}")))
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?)
        .add_directive("naga=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn load_config(args: &Args) -> Result<Configuration> {
    let mut cfg = match args.config.as_ref() {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(backend) = args.backend {
        cfg.render.backend = backend.into();
    }
    cfg.validated().context("invalid configuration values")
}

async fn export(cfg: Configuration, args: &Args, out: &Path) -> Result<()> {
    let engine = PreviewEngine::new(cfg);
    engine
        .initialize()
        .await
        .context("failed to initialize preview engine")?;
    engine
        .load_base_photo(&args.photo)
        .await
        .context("failed to load base photo")?;
    if let Some(art) = args.art.as_deref() {
        engine
            .load_overlay_art(art)
            .await
            .context("failed to load overlay artwork")?;
    }
    let mode = if args.artwork_only {
        ExportMode::ArtworkOnly
    } else {
        ExportMode::Composite
    };
    let png = engine.export_png(mode).context("failed to render preview")?;
    tokio::fs::write(out, &png)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), bytes = png.len(), ?mode, "preview exported");
    engine.dispose();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = load_config(&args)?;
    tracing::debug!("configuration:\n{:#?}", cfg);

    if let Some(out) = args.export.as_ref() {
        return export(cfg, &args, out).await;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; closing preview");
            cancel.cancel();
        });
    }

    let options = ViewerOptions {
        photo: args.photo.clone(),
        art: args.art.clone(),
        save_path: PathBuf::from("preview.png"),
    };
    // The window must own the main thread.
    tattoo_preview::run_windowed(cfg, options, cancel).context("viewer failed")
}
