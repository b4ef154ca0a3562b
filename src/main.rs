use clap::{Parser, Subcommand};
use gravure::codecs;
use gravure::color::BuiltinEngine;
use gravure::destination::{stock_destinations_toml, Destination, Destinations};
use gravure::error::Stage;
use gravure::pipeline;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "gravure")]
#[command(about = "Batch image finishing: crop, resample, sharpen, color-manage, dither")]
#[command(long_about = "\
Batch image finishing: crop, resample, sharpen, color-manage, dither

Destinations are declared once in destinations.toml and applied to every
source image. Each destination names a target box, crop policy, resampling
kernel, sharpening, color profile, bit depth, and format hints; a
destination may inherit another and override only the fields it sets.

Outputs land in the output directory as <source-stem>-<destination>.<ext>,
plus a -thumb companion for destinations with a thumbnail role.

Run 'gravure gen-config' to generate a documented destinations.toml.")]
#[command(version)]
struct Cli {
    /// Destination configuration file
    #[arg(long, default_value = "destinations.toml", global = true)]
    destinations: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render source images through every configured destination
    Render {
        /// Source image files, or directories to scan recursively
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Output directory
        #[arg(long, default_value = "out")]
        output: PathBuf,

        /// Render only the named destination (repeatable)
        #[arg(long = "only")]
        only: Vec<String>,

        /// Maximum parallel renders (defaults to the CPU core count)
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Validate the destination configuration without rendering
    Check,
    /// Print a stock destinations.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Render { sources, output, only, threads } => {
            init_thread_pool(threads);
            let dests = Destinations::load(&cli.destinations)?;
            let selected = select_destinations(&dests, &only)?;
            let files = collect_sources(&sources);
            if files.is_empty() {
                return Err("no decodable source images found".into());
            }
            std::fs::create_dir_all(&output)?;

            info!(
                sources = files.len(),
                destinations = selected.len(),
                output = %output.display(),
                "rendering"
            );
            let failures = render_batch(&files, &selected, &output);
            if failures > 0 {
                return Err(format!("{failures} render(s) failed").into());
            }
            info!("done");
        }
        Command::Check => {
            let dests = Destinations::load(&cli.destinations)?;
            for name in dests.names() {
                println!("{name}: ok");
            }
            println!("{} destination(s) valid", dests.len());
        }
        Command::GenConfig => {
            print!("{}", stock_destinations_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool. Callers can constrain down, not up.
fn init_thread_pool(threads: Option<usize>) {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let threads = threads.map(|n| n.min(cores)).unwrap_or(cores);
    rayon::ThreadPoolBuilder::new().num_threads(threads).build_global().ok();
}

/// Resolve `--only` names against the loaded configuration; an empty filter
/// selects everything.
fn select_destinations<'a>(
    dests: &'a Destinations,
    only: &[String],
) -> Result<Vec<(&'a str, &'a Destination)>, Box<dyn std::error::Error>> {
    if only.is_empty() {
        return Ok(dests.iter().collect());
    }
    let mut selected = Vec::new();
    for name in only {
        let entry = dests
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .ok_or_else(|| format!("unknown destination \"{name}\""))?;
        selected.push(entry);
    }
    Ok(selected)
}

/// Expand the source arguments into decodable files, scanning directories
/// recursively.
fn collect_sources(sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for source in sources {
        if source.is_dir() {
            for entry in WalkDir::new(source)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                if codecs::is_supported_input(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if codecs::is_supported_input(source) {
            files.push(source.clone());
        } else {
            error!(path = %source.display(), "skipping: unsupported file type");
        }
    }
    files
}

/// Render the whole batch, one rayon task per (source, destination) pair.
/// Returns the number of failed renders; failures never abort siblings.
fn render_batch(files: &[PathBuf], selected: &[(&str, &Destination)], output: &Path) -> usize {
    files
        .par_iter()
        .map(|file| {
            let source = match codecs::decode(file) {
                Ok(img) => img,
                Err(e) => {
                    error!(path = %file.display(), stage = %Stage::Decode, "{e}");
                    return selected.len();
                }
            };
            let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("image");

            selected
                .par_iter()
                .map(|(name, dest)| {
                    let ext = dest.output_format().extension();
                    let out_path = output.join(format!("{stem}-{name}.{ext}"));
                    let mut failed = 0usize;

                    if let Err(e) =
                        pipeline::render_to_path(&source, name, dest, &BuiltinEngine, &out_path)
                    {
                        error!(path = %file.display(), "{e}");
                        failed += 1;
                    }

                    if let Some(result) =
                        pipeline::render_thumbnail(&source, name, dest, &BuiltinEngine)
                    {
                        let thumb_path = output.join(format!("{stem}-{name}-thumb.{ext}"));
                        let written = result.and_then(|thumb| {
                            codecs::encode(&thumb, dest, &thumb_path).map_err(|e| {
                                gravure::error::RenderError::new(name, Stage::Encode, e)
                            })
                        });
                        if let Err(e) = written {
                            error!(path = %file.display(), "{e}");
                            failed += 1;
                        }
                    }
                    failed
                })
                .sum::<usize>()
        })
        .sum()
}
