use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use webp_sidecar::backend::BackendRegistry;
use webp_sidecar::config::{self, Settings};
use webp_sidecar::engine::ConversionEngine;
use webp_sidecar::paths::UploadBase;
use webp_sidecar::types::ImageSource;

#[derive(Parser)]
#[command(name = "webp-sidecar")]
#[command(about = "Convert JPEG/PNG images to sibling WebP files")]
#[command(long_about = "\
Convert JPEG/PNG images to sibling WebP files

Every source image gets a .webp sibling next to it — same directory, same
basename, extension swapped. Already-converted images are skipped via a
plain existence check, so re-running over the same tree is cheap.

  uploads/
  ├── 2024/01/photo.jpeg       # source
  └── 2024/01/photo.webp       # derived sibling

Settings come from config.toml (run 'webp-sidecar gen-config' for a
documented stock file); --quality and --converter override it per run.")]
#[command(version)]
struct Cli {
    /// Settings file (stock defaults are used when it does not exist)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Override the configured encode quality (0-100)
    #[arg(long, global = true)]
    quality: Option<u8>,

    /// Override the configured backend (gd, cwebp, ffmpeg, imagick, gmagick)
    #[arg(long, global = true)]
    converter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a single image, writing its .webp sibling
    Convert {
        /// Source image file
        file: PathBuf,
    },
    /// Walk a directory tree and convert every JPEG/PNG lacking a sibling
    Sweep {
        /// Root of the uploads tree
        dir: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Outcome counts for one sweep run.
#[derive(Debug, Default, Serialize)]
struct SweepReport {
    converted: u64,
    skipped: u64,
    failed: u64,
    errors: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)?;
    if let Some(quality) = cli.quality {
        settings.quality = quality;
    }
    if let Some(converter) = &cli.converter {
        settings.converter = converter.clone();
    }
    settings.validate()?;

    match cli.command {
        Command::Convert { file } => {
            let file = file.canonicalize()?;
            let dir = file
                .parent()
                .ok_or("source file has no parent directory")?
                .to_path_buf();
            let engine = engine_for(&dir, settings);
            let source = cli_source(&file);
            match engine.convert_at(&source, Some(&file)) {
                Ok(_) => {
                    let mut dest = file.clone();
                    dest.set_extension("webp");
                    println!("{}", dest.display());
                }
                Err(e) => return Err(format!("conversion failed: {e}").into()),
            }
        }
        Command::Sweep { dir, json } => {
            let dir = dir.canonicalize()?;
            let engine = engine_for(&dir, settings);
            let report = sweep(&engine, &dir);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Converted {}, skipped {} (already present), failed {}",
                    report.converted, report.skipped, report.failed
                );
                for error in &report.errors {
                    eprintln!("  {error}");
                }
            }
            if report.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Build an engine rooted at a local directory.
///
/// The CLI has no public host in front of it, so the upload base maps a
/// `file://` URL prefix onto the directory itself.
fn engine_for(dir: &Path, settings: Settings) -> ConversionEngine {
    let base_url = format!("file://{}", dir.display());
    ConversionEngine::new(
        UploadBase::new(base_url, dir),
        BackendRegistry::with_defaults(),
        settings,
    )
}

/// CLI conversions carry attachment id 0 ("none").
fn cli_source(file: &Path) -> ImageSource {
    ImageSource::new(0, format!("file://{}", file.display()))
}

/// Convert every JPEG/PNG under `dir` that lacks a `.webp` sibling.
fn sweep(engine: &ConversionEngine, dir: &Path) -> SweepReport {
    let mut report = SweepReport::default();

    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_candidate = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"));
        if !is_candidate {
            continue;
        }

        let mut sibling = path.to_path_buf();
        sibling.set_extension("webp");
        if sibling.is_file() {
            report.skipped += 1;
            continue;
        }

        let source = cli_source(path);
        match engine.convert_at(&source, Some(path)) {
            Ok(_) => report.converted += 1,
            Err(e) => {
                report.failed += 1;
                report.errors.push(e.to_string());
            }
        }
    }

    report
}
