//! Search diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter experimentation. [`search_with_diagnostics`] runs the same
//! stages as [`search`](crate::search) and records a
//! [`StageDiagnostics`] for each one.
//!
//! Time is read through the [`Clock`] trait so the library itself never
//! touches a platform clock; callers supply one (the bench CLI wraps
//! [`std::time::Instant`]).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::segment::Segmenter;
use crate::texture::TextureDescriptor;
use crate::types::{Region, RegionId, SearchConfig, SearchError, SearchResult};
use crate::{adjacency, color, decode, extract, merge, resize, segment};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic time for stage measurements.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: resize to the working resolution.
    pub resize: StageDiagnostics,
    /// Stage 3: oversegmentation.
    pub segmentation: StageDiagnostics,
    /// Stage 4: texture map.
    pub texture: StageDiagnostics,
    /// Stage 5: HSV conversion and region extraction.
    pub extraction: StageDiagnostics,
    /// Stage 6: adjacency edges.
    pub adjacency: StageDiagnostics,
    /// Stage 7: hierarchical merging.
    pub merge: StageDiagnostics,
    /// Total wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: SearchSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Resize metrics.
    Resize {
        /// Resampling filter name.
        filter: String,
        /// Working image width in pixels.
        width: u32,
        /// Working image height in pixels.
        height: u32,
        /// Whether the image was actually resampled.
        resized: bool,
    },
    /// Oversegmentation metrics.
    Segmentation {
        /// Threshold scale.
        scale: f32,
        /// Pre-smoothing sigma.
        sigma: f32,
        /// Minimum component size.
        min_size: u32,
        /// Number of segments produced.
        segment_count: usize,
    },
    /// Texture map metrics.
    Texture {
        /// Descriptor name.
        descriptor: String,
    },
    /// Region extraction metrics.
    Extraction {
        /// Number of initial regions.
        region_count: usize,
        /// Smallest region in pixels.
        min_region_size: u64,
        /// Largest region in pixels.
        max_region_size: u64,
        /// Mean region size in pixels.
        mean_region_size: f64,
    },
    /// Adjacency metrics.
    Adjacency {
        /// Adjacency rule name.
        rule: String,
        /// Number of adjacent pairs.
        edge_count: usize,
        /// Mean number of neighbours per region.
        mean_degree: f64,
    },
    /// Merge metrics.
    Merge {
        /// Merges performed.
        merge_count: usize,
        /// Regions in the final hierarchy.
        region_count: usize,
        /// Score of the first merge, if any.
        first_score: Option<f64>,
        /// Score of the last merge, if any.
        last_score: Option<f64>,
    },
}

/// High-level summary counts for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSummary {
    /// Decoded image width in pixels.
    pub image_width: u32,
    /// Decoded image height in pixels.
    pub image_height: u32,
    /// Working image width in pixels.
    pub working_width: u32,
    /// Working image height in pixels.
    pub working_height: u32,
    /// Regions produced by the segmentation.
    pub initial_region_count: usize,
    /// Regions in the final hierarchy.
    pub region_count: usize,
    /// Regions never consumed by a merge.
    pub root_count: usize,
}

impl SearchDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Selective Search Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} -> working {}x{}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.working_width,
            self.summary.working_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Initial regions: {}  |  Hierarchy: {}  |  Roots: {}",
            self.summary.initial_region_count, self.summary.region_count, self.summary.root_count,
        ));

        lines.join("\n")
    }

    /// Stages in execution order with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 7] {
        [
            ("Decode", &self.decode),
            ("Resize", &self.resize),
            ("Segmentation", &self.segmentation),
            ("Texture", &self.texture),
            ("Extraction", &self.extraction),
            ("Adjacency", &self.adjacency),
            ("Merge", &self.merge),
        ]
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Resize {
            filter,
            width,
            height,
            resized,
        } => {
            if *resized {
                format!("{filter} -> {width}x{height}")
            } else {
                format!("skipped ({width}x{height})")
            }
        }
        StageMetrics::Segmentation {
            scale,
            sigma,
            min_size,
            segment_count,
        } => format!("scale={scale:.0} sigma={sigma:.2} min_size={min_size} -> {segment_count} segments"),
        StageMetrics::Texture { descriptor } => descriptor.clone(),
        StageMetrics::Extraction {
            region_count,
            min_region_size,
            max_region_size,
            mean_region_size,
        } => format!(
            "{region_count} regions (min={min_region_size} max={max_region_size} mean={mean_region_size:.1} px)"
        ),
        StageMetrics::Adjacency {
            rule,
            edge_count,
            mean_degree,
        } => format!("{rule}: {edge_count} edges (mean degree {mean_degree:.2})"),
        StageMetrics::Merge {
            merge_count,
            region_count,
            first_score,
            last_score,
        } => match (first_score, last_score) {
            (Some(first), Some(last)) => format!(
                "{merge_count} merges -> {region_count} regions (score {first:.3} .. {last:.3})"
            ),
            _ => format!("{merge_count} merges -> {region_count} regions"),
        },
    }
}

/// Size statistics over a set of regions: `(min, max, mean)`.
#[allow(clippy::cast_precision_loss)]
fn region_size_stats(regions: &BTreeMap<RegionId, Region>) -> (u64, u64, f64) {
    let min = regions.values().map(Region::size).min().unwrap_or(0);
    let max = regions.values().map(Region::size).max().unwrap_or(0);
    let mean = if regions.is_empty() {
        0.0
    } else {
        regions.values().map(Region::size).sum::<u64>() as f64 / regions.len() as f64
    };
    (min, max, mean)
}

/// Run a stage, returning its output and elapsed time.
fn timed<C: Clock, T>(clock: &C, stage: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = stage();
    (out, clock.elapsed(&start))
}

/// Run [`search`](crate::search) and collect per-stage diagnostics.
///
/// # Errors
///
/// Same as [`search`](crate::search).
#[allow(clippy::cast_precision_loss)]
pub fn search_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &SearchConfig,
    clock: &C,
) -> Result<(SearchResult, SearchDiagnostics), SearchError> {
    config.validate()?;
    let run_start = clock.now();

    let (decoded, decode_time) = timed(clock, || decode::decode(image_bytes));
    let image = decoded?;
    let decode = StageDiagnostics {
        duration: decode_time,
        metrics: StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: image.width(),
            height: image.height(),
            pixel_count: u64::from(image.width()) * u64::from(image.height()),
        },
    };

    let ((working, resized), resize_time) = timed(clock, || {
        resize::resize_square(&image, config.working_resolution, config.resize_filter)
    });
    let resize = StageDiagnostics {
        duration: resize_time,
        metrics: StageMetrics::Resize {
            filter: config.resize_filter.to_string(),
            width: working.width(),
            height: working.height(),
            resized,
        },
    };

    let (labels, segment_time) = timed(clock, || {
        segment::Felzenszwalb::new(config.segmentation).segment(&working)
    });
    let segmentation = StageDiagnostics {
        duration: segment_time,
        metrics: StageMetrics::Segmentation {
            scale: config.segmentation.scale,
            sigma: config.segmentation.sigma,
            min_size: config.segmentation.min_size,
            segment_count: labels.label_count(),
        },
    };

    let (texture_map, texture_time) = timed(clock, || config.texture.describe(&working));
    let texture = StageDiagnostics {
        duration: texture_time,
        metrics: StageMetrics::Texture {
            descriptor: format!("{:?}", config.texture),
        },
    };

    let (extracted, extract_time) = timed(clock, || {
        let hsv = color::rgb_to_hsv(&working);
        extract::extract_regions(&labels, &hsv, &texture_map)
    });
    let regions = extracted?;
    let initial_region_count = regions.len();
    let (min_region_size, max_region_size, mean_region_size) = region_size_stats(&regions);
    let extraction = StageDiagnostics {
        duration: extract_time,
        metrics: StageMetrics::Extraction {
            region_count: initial_region_count,
            min_region_size,
            max_region_size,
            mean_region_size,
        },
    };

    let (pairs, adjacency_time) =
        timed(clock, || adjacency::adjacent_pairs(&regions, &config.adjacency));
    let mean_degree = if initial_region_count == 0 {
        0.0
    } else {
        2.0 * pairs.len() as f64 / initial_region_count as f64
    };
    let adjacency = StageDiagnostics {
        duration: adjacency_time,
        metrics: StageMetrics::Adjacency {
            rule: format!("{:?}", config.adjacency),
            edge_count: pairs.len(),
            mean_degree,
        },
    };

    let dimensions = labels.dimensions();
    let (merged, merge_time) = timed(clock, || {
        merge::hierarchical_merge(
            regions,
            &pairs,
            dimensions.pixel_count(),
            config.max_merges,
        )
    });
    let (regions, merges) = merged?;
    let merge = StageDiagnostics {
        duration: merge_time,
        metrics: StageMetrics::Merge {
            merge_count: merges.len(),
            region_count: regions.len(),
            first_score: merges.first().map(|step| step.score),
            last_score: merges.last().map(|step| step.score),
        },
    };

    let result = SearchResult {
        regions,
        merges,
        initial_region_count,
        dimensions,
    };

    let summary = SearchSummary {
        image_width: image.width(),
        image_height: image.height(),
        working_width: dimensions.width,
        working_height: dimensions.height,
        initial_region_count,
        region_count: result.len(),
        root_count: result.roots().count(),
    };

    let diagnostics = SearchDiagnostics {
        decode,
        resize,
        segmentation,
        texture,
        extraction,
        adjacency,
        merge,
        total_duration: clock.elapsed(&run_start),
        summary,
    };

    log::debug!(
        "search finished in {:.3}ms",
        duration_ms(diagnostics.total_duration)
    );

    Ok((result, diagnostics))
}
