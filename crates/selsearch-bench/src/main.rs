//! selsearch-bench: CLI tool for selective search experimentation and diagnostics.
//!
//! Runs the region-merging pipeline on a given image file with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Tuning segmentation scale, sigma, and minimum size
//! - Comparing adjacency rules and working resolutions
//! - Measuring per-stage durations to identify bottlenecks
//! - Dumping the resulting proposals for inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin selsearch-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use selsearch_pipeline::diagnostics::{Clock, SearchDiagnostics};
use selsearch_pipeline::{
    AdjacencyKind, ProposalFilter, ResizeFilter, SearchConfig, SegmentationConfig,
};

/// Selective search parameter experimentation and diagnostics.
///
/// Runs the pipeline on a given image with configurable parameters and
/// prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "selsearch-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Side of the square working image in pixels.
    #[arg(long, default_value_t = SearchConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Resize filter (disabled, nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    resize_filter: Filter,

    /// Segmentation threshold scale.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_SCALE)]
    scale: f32,

    /// Segmentation pre-smoothing sigma.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_SIGMA)]
    sigma: f32,

    /// Minimum segment size in pixels.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_MIN_SIZE)]
    min_size: u32,

    /// Region adjacency rule.
    #[arg(long, value_enum, default_value_t = Adjacency::Touching)]
    adjacency: Adjacency,

    /// Stop after this many merges.
    #[arg(long)]
    max_merges: Option<usize>,

    /// Write proposals as JSON to this file (first run only).
    #[arg(long)]
    proposals: Option<PathBuf>,

    /// Drop proposals smaller than this many pixels.
    #[arg(long, default_value_t = 0)]
    min_proposal_size: u64,

    /// Drop proposals more elongated than this aspect ratio.
    #[arg(long)]
    max_aspect_ratio: Option<f64>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full search config as a JSON string.
    ///
    /// When provided, all other search parameter flags are ignored.
    /// The JSON must be a valid `SearchConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Log level spec (e.g. `debug`, `selsearch_pipeline=trace`).
    ///
    /// Falls back to `RUST_LOG`, then to `warn`.
    #[arg(long)]
    log_level: Option<String>,
}

/// Adjacency rule selection.
#[derive(Clone, Copy, ValueEnum)]
enum Adjacency {
    /// Bounding boxes overlap or touch.
    Touching,
    /// A corner of the higher-id box lies strictly inside the lower-id box.
    CornerContainment,
}

/// Resize resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Disabled: keep the decoded size.
    Disabled,
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`ResizeFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: ResizeFilter) -> Filter {
    match f {
        ResizeFilter::Disabled => Filter::Disabled,
        ResizeFilter::Nearest => Filter::Nearest,
        ResizeFilter::Triangle => Filter::Triangle,
        ResizeFilter::CatmullRom => Filter::CatmullRom,
        ResizeFilter::Gaussian => Filter::Gaussian,
        ResizeFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`SearchConfig::DEFAULT_RESIZE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(SearchConfig::DEFAULT_RESIZE_FILTER);

/// Build a [`SearchConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<SearchConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(SearchConfig {
        working_resolution: cli.working_resolution,
        resize_filter: match cli.resize_filter {
            Filter::Disabled => ResizeFilter::Disabled,
            Filter::Nearest => ResizeFilter::Nearest,
            Filter::Triangle => ResizeFilter::Triangle,
            Filter::CatmullRom => ResizeFilter::CatmullRom,
            Filter::Gaussian => ResizeFilter::Gaussian,
            Filter::Lanczos3 => ResizeFilter::Lanczos3,
        },
        segmentation: SegmentationConfig {
            scale: cli.scale,
            sigma: cli.sigma,
            min_size: cli.min_size,
        },
        adjacency: match cli.adjacency {
            Adjacency::Touching => AdjacencyKind::Touching,
            Adjacency::CornerContainment => AdjacencyKind::CornerContainment,
        },
        max_merges: cli.max_merges,
        ..SearchConfig::default()
    })
}

/// Install the global logger. `--log-level` wins over `RUST_LOG`.
///
/// The returned handle must stay alive for the duration of the run.
fn init_logging(cli: &Cli) -> Result<flexi_logger::LoggerHandle, String> {
    let logger = match cli.log_level {
        Some(ref spec) => flexi_logger::Logger::try_with_str(spec),
        None => flexi_logger::Logger::try_with_env_or_str("warn"),
    }
    .map_err(|e| format!("Error parsing log level: {e}"))?;

    logger
        .log_to_stderr()
        .start()
        .map_err(|e| format!("Error starting logger: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match init_logging(&cli) {
        Ok(handle) => handle,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let filter = ProposalFilter {
        min_size: cli.min_proposal_size,
        max_aspect_ratio: cli.max_aspect_ratio,
    };
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match selsearch_pipeline::diagnostics::search_with_diagnostics(
            &image_bytes,
            &config,
            &StdClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write proposals on the first run only.
                if run == 0
                    && let Some(ref path) = cli.proposals
                {
                    let proposals = selsearch_pipeline::proposals(&result, &filter);
                    let written = serde_json::to_string_pretty(&proposals)
                        .map_err(|e| e.to_string())
                        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
                    match written {
                        Ok(()) => {
                            eprintln!(
                                "{} proposals written to {}",
                                proposals.len(),
                                path.display(),
                            );
                        }
                        Err(e) => {
                            eprintln!("Error writing proposals to {}: {e}", path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Search error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SearchDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(32));

    for (index, (name, _)) in first.stages().iter().enumerate() {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[index].1.duration.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
