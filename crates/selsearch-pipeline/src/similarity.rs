//! Pairwise region similarity.
//!
//! The score is the unweighted sum of four cues. Color and texture lie
//! in `[0, 1]`; size and fill are at most 1 and may go negative for
//! very large or very sparse pairs.

use crate::types::{Region, SearchError};

/// Histogram intersection: the sum of per-bin minimums.
///
/// # Errors
///
/// Returns [`SearchError::ShapeMismatch`] if the histograms differ in
/// length.
pub fn histogram_intersection(a: &[f64], b: &[f64]) -> Result<f64, SearchError> {
    if a.len() != b.len() {
        return Err(SearchError::ShapeMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x.min(*y)).sum())
}

/// Color cue: intersection of the color histograms.
///
/// # Errors
///
/// Returns [`SearchError::ShapeMismatch`] on a histogram length mismatch.
pub fn color_similarity(r1: &Region, r2: &Region) -> Result<f64, SearchError> {
    histogram_intersection(r1.color_hist(), r2.color_hist())
}

/// Texture cue: intersection of the texture histograms.
///
/// # Errors
///
/// Returns [`SearchError::ShapeMismatch`] on a histogram length mismatch.
pub fn texture_similarity(r1: &Region, r2: &Region) -> Result<f64, SearchError> {
    histogram_intersection(r1.texture_hist(), r2.texture_hist())
}

/// Size cue: `1 - (size1 + size2) / image_size`.
///
/// Favours merging small regions first.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn size_similarity(r1: &Region, r2: &Region, image_size: u64) -> f64 {
    1.0 - (r1.size() + r2.size()) as f64 / image_size as f64
}

/// Fill cue: `1 - (union_extent - size1 - size2) / image_size`.
///
/// Favours pairs that fill their joint bounding box.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fill_similarity(r1: &Region, r2: &Region, image_size: u64) -> f64 {
    let extent = r1.bbox().union(&r2.bbox()).extent_area() as f64;
    1.0 - (extent - r1.size() as f64 - r2.size() as f64) / image_size as f64
}

/// Combined similarity of two regions in an image of `image_size` pixels.
///
/// # Errors
///
/// Returns [`SearchError::ShapeMismatch`] if the regions' histograms
/// differ in length, which means extraction produced inconsistent
/// regions.
pub fn score(r1: &Region, r2: &Region, image_size: u64) -> Result<f64, SearchError> {
    Ok(color_similarity(r1, r2)?
        + texture_similarity(r1, r2)?
        + size_similarity(r1, r2, image_size)
        + fill_similarity(r1, r2, image_size))
}
