//! Initial oversegmentation.
//!
//! This module defines the [`Segmenter`] trait for pluggable
//! oversegmentation strategies and [`Felzenszwalb`], the graph-based
//! segmentation of Felzenszwalb and Huttenlocher used by default.
//!
//! # Algorithm overview
//!
//! 1. Smooth each channel with a Gaussian of width `sigma`.
//! 2. Build the 8-connected pixel graph, weighting each edge by the RGB
//!    Euclidean distance of its endpoints.
//! 3. Visit edges by ascending weight (Kruskal order). Join the two
//!    components when the weight does not exceed
//!    `min(int(C1) + scale / |C1|, int(C2) + scale / |C2|)`, where
//!    `int(C)` is the heaviest edge already inside `C`.
//! 4. Revisit the edges in the same order and join any pair where one
//!    side is smaller than `min_size` pixels.
//! 5. Relabel components densely in raster order of first appearance.

use petgraph::unionfind::UnionFind;

use crate::blur::gaussian_blur_rgb;
use crate::types::{LabelMap, RgbImage, SegmentationConfig};

/// Trait for oversegmentation strategies.
///
/// Input: an RGB image.
/// Output: a label map of the same dimensions; labels need not be dense
/// but every pixel gets one.
pub trait Segmenter {
    /// Assign a superpixel label to every pixel of `image`.
    fn segment(&self, image: &RgbImage) -> LabelMap;
}

/// Graph-based segmentation (Felzenszwalb & Huttenlocher, 2004).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Felzenszwalb {
    /// Threshold scale, smoothing sigma, and minimum component size.
    pub config: SegmentationConfig,
}

impl Felzenszwalb {
    /// Create a segmenter with the given parameters.
    #[must_use]
    pub const fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }
}

impl Segmenter for Felzenszwalb {
    fn segment(&self, image: &RgbImage) -> LabelMap {
        felzenszwalb(image, &self.config)
    }
}

/// A weighted edge between two pixel indices.
#[derive(Debug, Clone, Copy)]
struct PixelEdge {
    weight: f32,
    a: usize,
    b: usize,
}

/// Neighbour offsets that cover each 8-connected pair exactly once.
const FORWARD_OFFSETS: [(i64, i64); 4] = [(1, 0), (1, 1), (0, 1), (-1, 1)];

/// RGB Euclidean distance.
fn color_distance(p: [u8; 3], q: [u8; 3]) -> f32 {
    p.iter()
        .zip(q)
        .map(|(&a, b)| {
            let d = f32::from(a) - f32::from(b);
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// All 8-connected edges, sorted by ascending weight.
///
/// The sort is stable so equal weights keep raster construction order.
fn build_edges(image: &RgbImage) -> Vec<PixelEdge> {
    let (w, h) = image.dimensions();
    let (wi, hi) = (i64::from(w), i64::from(h));
    let width = w as usize;
    let mut edges = Vec::with_capacity(width * h as usize * FORWARD_OFFSETS.len());

    for y in 0..h {
        for x in 0..w {
            let here = image.get_pixel(x, y).0;
            for (dx, dy) in FORWARD_OFFSETS {
                let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
                if nx < 0 || nx >= wi || ny >= hi {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let (nx, ny) = (nx as u32, ny as u32);
                edges.push(PixelEdge {
                    weight: color_distance(here, image.get_pixel(nx, ny).0),
                    a: y as usize * width + x as usize,
                    b: ny as usize * width + nx as usize,
                });
            }
        }
    }

    edges.sort_by(|p, q| p.weight.total_cmp(&q.weight));
    edges
}

/// Component bookkeeping on top of the union-find.
struct Components {
    uf: UnionFind<usize>,
    size: Vec<u32>,
    internal: Vec<f32>,
}

impl Components {
    fn new(n: usize) -> Self {
        Self {
            uf: UnionFind::new(n),
            size: vec![1; n],
            internal: vec![0.0; n],
        }
    }

    /// Join the components rooted at `ra` and `rb`, recording `weight`
    /// as the new internal difference.
    fn join(&mut self, ra: usize, rb: usize, weight: f32) {
        let size = self.size[ra] + self.size[rb];
        self.uf.union(ra, rb);
        let root = self.uf.find_mut(ra);
        self.size[root] = size;
        self.internal[root] = weight;
    }
}

/// Run graph-based segmentation with `config`.
#[must_use = "returns the label map"]
#[allow(clippy::cast_precision_loss)]
pub fn felzenszwalb(image: &RgbImage, config: &SegmentationConfig) -> LabelMap {
    let (w, h) = image.dimensions();
    let n = w as usize * h as usize;
    if n == 0 {
        return LabelMap::from_fn(w, h, |_, _| 0);
    }

    let smoothed = gaussian_blur_rgb(image, config.sigma);
    let edges = build_edges(&smoothed);
    let mut comps = Components::new(n);

    for edge in &edges {
        let ra = comps.uf.find_mut(edge.a);
        let rb = comps.uf.find_mut(edge.b);
        if ra == rb {
            continue;
        }
        let threshold_a = comps.internal[ra] + config.scale / comps.size[ra] as f32;
        let threshold_b = comps.internal[rb] + config.scale / comps.size[rb] as f32;
        if edge.weight <= threshold_a.min(threshold_b) {
            comps.join(ra, rb, edge.weight);
        }
    }

    for edge in &edges {
        let ra = comps.uf.find_mut(edge.a);
        let rb = comps.uf.find_mut(edge.b);
        if ra != rb && (comps.size[ra] < config.min_size || comps.size[rb] < config.min_size) {
            comps.join(ra, rb, edge.weight);
        }
    }

    // Dense relabel in raster order.
    let mut dense = vec![u32::MAX; n];
    let mut next = 0u32;
    let labels = LabelMap::from_fn(w, h, |x, y| {
        let root = comps.uf.find_mut(y as usize * w as usize + x as usize);
        if dense[root] == u32::MAX {
            dense[root] = next;
            next += 1;
        }
        dense[root]
    });

    log::debug!(
        "segmented {w}x{h} image into {next} components (scale {}, sigma {}, min_size {})",
        config.scale,
        config.sigma,
        config.min_size,
    );

    labels
}
