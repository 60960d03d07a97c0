//! Initial region extraction.
//!
//! Turns a label map plus its HSV image and texture map into one
//! [`Region`] per label: bounding box, pixel count, and the two
//! L1-normalized histograms the similarity cues compare. Channel
//! histograms are concatenated and normalized together, so each
//! histogram sums to 1.
//!
//! Histogram ranges are fixed: `[0, 255]` for HSV channels and `[0, 1]`
//! for texture channels. Values outside a range are clamped into the
//! first or last bin so every pixel is counted.

use std::collections::BTreeMap;

use image::Rgb32FImage;

use crate::types::{
    BoundingBox, CHANNELS, COLOR_BINS, COLOR_HIST_LEN, LabelMap, Region, RegionId, SearchError,
    TEXTURE_BINS, TEXTURE_HIST_LEN,
};

/// Value range of the color histogram.
pub const COLOR_RANGE: (f32, f32) = (0.0, 255.0);

/// Value range of the texture histogram.
pub const TEXTURE_RANGE: (f32, f32) = (0.0, 1.0);

/// Raw per-label accumulation before normalization.
struct LabelStats {
    bbox: BoundingBox,
    size: u64,
    color_counts: [u64; COLOR_HIST_LEN],
    texture_counts: [u64; TEXTURE_HIST_LEN],
}

impl LabelStats {
    const fn new(x: u32, y: u32) -> Self {
        Self {
            bbox: BoundingBox::from_pixel(x, y),
            size: 0,
            color_counts: [0; COLOR_HIST_LEN],
            texture_counts: [0; TEXTURE_HIST_LEN],
        }
    }
}

/// Bin index of `value` in an equal-width histogram over `[lo, hi]`.
///
/// `hi` itself falls in the last bin. Values below `lo` (and NaN) go to
/// the first bin, values above `hi` to the last.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bin_index(value: f32, (lo, hi): (f32, f32), bins: usize) -> usize {
    if value.is_nan() || value <= lo {
        return 0;
    }
    let scaled = (value - lo) / (hi - lo) * bins as f32;
    (scaled as usize).min(bins - 1)
}

/// Divide every bin by the total count so the histogram sums to 1.
///
/// The total spans all channels, so a region of `n` pixels is divided
/// by `n * CHANNELS`. An empty histogram stays all-zero.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn normalize_counts(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    let total = total as f64;
    counts.iter().map(|&c| c as f64 / total).collect()
}

/// Build one [`Region`] per label.
///
/// `hsv` is the image converted to HSV on a 0-255 scale and `texture`
/// its texture map; both must match the label map's dimensions.
///
/// # Errors
///
/// Returns [`SearchError::InvalidInput`] if the three rasters disagree
/// in size.
pub fn extract_regions(
    labels: &LabelMap,
    hsv: &Rgb32FImage,
    texture: &Rgb32FImage,
) -> Result<BTreeMap<RegionId, Region>, SearchError> {
    let dims = (labels.width(), labels.height());
    if hsv.dimensions() != dims {
        return Err(SearchError::InvalidInput(format!(
            "label map is {}x{} but color image is {}x{}",
            dims.0,
            dims.1,
            hsv.width(),
            hsv.height(),
        )));
    }
    if texture.dimensions() != dims {
        return Err(SearchError::InvalidInput(format!(
            "label map is {}x{} but texture map is {}x{}",
            dims.0,
            dims.1,
            texture.width(),
            texture.height(),
        )));
    }

    let mut stats: BTreeMap<u32, LabelStats> = BTreeMap::new();

    for (x, y, label) in labels.enumerate() {
        let entry = stats
            .entry(label)
            .or_insert_with(|| LabelStats::new(x, y));
        entry.bbox.include(x, y);
        entry.size += 1;

        let color = hsv.get_pixel(x, y).0;
        let tex = texture.get_pixel(x, y).0;
        for c in 0..CHANNELS {
            entry.color_counts[c * COLOR_BINS + bin_index(color[c], COLOR_RANGE, COLOR_BINS)] += 1;
            entry.texture_counts
                [c * TEXTURE_BINS + bin_index(tex[c], TEXTURE_RANGE, TEXTURE_BINS)] += 1;
        }
    }

    let regions: BTreeMap<RegionId, Region> = stats
        .into_iter()
        .map(|(label, s)| {
            let id = RegionId::from(label);
            let region = Region::from_parts(
                id,
                s.bbox,
                s.size,
                normalize_counts(&s.color_counts),
                normalize_counts(&s.texture_counts),
                vec![label],
            );
            (id, region)
        })
        .collect();

    log::debug!(
        "extracted {} regions from {}x{} label map",
        regions.len(),
        dims.0,
        dims.1,
    );

    Ok(regions)
}
