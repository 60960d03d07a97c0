//! Shared types for the selsearch region-merging pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyKind;
use crate::merge::MergeStep;
use crate::resize::ResizeFilter;
use crate::texture::TextureDescriptorKind;

/// Re-export `RgbImage` so downstream crates can hand images to the
/// pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `Rgb32FImage`, the float raster used for HSV and texture maps.
pub use image::Rgb32FImage;

/// Number of channels contributing to each histogram.
pub const CHANNELS: usize = 3;

/// Bins per channel in the color histogram.
pub const COLOR_BINS: usize = 25;

/// Bins per channel in the texture histogram.
pub const TEXTURE_BINS: usize = 10;

/// Total length of a region's color histogram.
pub const COLOR_HIST_LEN: usize = COLOR_BINS * CHANNELS;

/// Total length of a region's texture histogram.
pub const TEXTURE_HIST_LEN: usize = TEXTURE_BINS * CHANNELS;

/// Key identifying a region.
///
/// Original regions use their segmentation label. Merge products take
/// values above every id ever issued in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(u64);

impl RegionId {
    /// Create an id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u32> for RegionId {
    fn from(label: u32) -> Self {
        Self(u64::from(label))
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive pixel bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Leftmost pixel column.
    pub min_x: u32,
    /// Topmost pixel row.
    pub min_y: u32,
    /// Rightmost pixel column.
    pub max_x: u32,
    /// Bottommost pixel row.
    pub max_y: u32,
}

impl BoundingBox {
    /// Create a bounding box from its extrema.
    #[must_use]
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The box covering exactly one pixel.
    #[must_use]
    pub const fn from_pixel(x: u32, y: u32) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grow the box to include pixel `(x, y)`.
    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// Area spanned by the extrema, `(max_x - min_x) * (max_y - min_y)`.
    ///
    /// This is the measure used by the fill cue. It is one pixel short
    /// of the covered area on each axis.
    #[must_use]
    pub fn extent_area(&self) -> u64 {
        u64::from(self.max_x - self.min_x) * u64::from(self.max_y - self.min_y)
    }

    /// Pixel rectangle covered by the box.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        Rect {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
        }
    }
}

/// Candidate rectangle `(x, y, width, height)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels (at least 1).
    pub width: u32,
    /// Height in pixels (at least 1).
    pub height: u32,
}

/// A region of the hierarchy: either an original segment or the product
/// of merging two regions.
///
/// Regions are immutable once built. Histograms are L1-normalized and
/// all-zero for an empty region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    bbox: BoundingBox,
    size: u64,
    color_hist: Vec<f64>,
    texture_hist: Vec<f64>,
    member_labels: Vec<u32>,
}

impl Region {
    /// Assemble a region from already-normalized parts.
    pub(crate) const fn from_parts(
        id: RegionId,
        bbox: BoundingBox,
        size: u64,
        color_hist: Vec<f64>,
        texture_hist: Vec<f64>,
        member_labels: Vec<u32>,
    ) -> Self {
        Self {
            id,
            bbox,
            size,
            color_hist,
            texture_hist,
            member_labels,
        }
    }

    /// Unique key of this region.
    #[must_use]
    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// Bounding box of all member pixels.
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Candidate rectangle derived from the bounding box.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        self.bbox.rect()
    }

    /// Number of member pixels.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Color histogram (HSV, [`COLOR_BINS`] bins per channel).
    #[must_use]
    pub fn color_hist(&self) -> &[f64] {
        &self.color_hist
    }

    /// Texture histogram ([`TEXTURE_BINS`] bins per channel).
    #[must_use]
    pub fn texture_hist(&self) -> &[f64] {
        &self.texture_hist
    }

    /// Original segmentation labels absorbed into this region, in merge order.
    #[must_use]
    pub fn member_labels(&self) -> &[u32] {
        &self.member_labels
    }

    /// Returns `true` if this region came straight from the segmentation.
    #[must_use]
    pub fn is_original(&self) -> bool {
        self.member_labels.len() == 1 && RegionId::from(self.member_labels[0]) == self.id
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Per-pixel superpixel labels, row-major.
///
/// Deserialization goes through [`LabelMap::from_raw`], so a buffer whose
/// length is not `width * height` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LabelMapRaw")]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<u32>,
}

/// Unchecked wire form of [`LabelMap`].
#[derive(Deserialize)]
struct LabelMapRaw {
    width: u32,
    height: u32,
    labels: Vec<u32>,
}

impl TryFrom<LabelMapRaw> for LabelMap {
    type Error = SearchError;

    fn try_from(raw: LabelMapRaw) -> Result<Self, Self::Error> {
        Self::from_raw(raw.width, raw.height, raw.labels)
    }
}

impl LabelMap {
    /// Wrap a row-major label buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidInput`] if `labels.len()` is not
    /// `width * height`.
    pub fn from_raw(width: u32, height: u32, labels: Vec<u32>) -> Result<Self, SearchError> {
        let expected = u64::from(width) * u64::from(height);
        if labels.len() as u64 != expected {
            return Err(SearchError::InvalidInput(format!(
                "label buffer has {} entries, expected {width}x{height} = {expected}",
                labels.len(),
            )));
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// Build a label map by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u32) -> Self {
        let mut labels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                labels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            labels,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions of the map.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Label at `(x, y)`. Panics on out-of-range coordinates, like
    /// `ImageBuffer::get_pixel`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// Row-major label buffer.
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn label_count(&self) -> usize {
        let mut seen: Vec<u32> = self.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Iterate `(x, y, label)` in raster order.
    pub fn enumerate(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        let width = self.width.max(1);
        (0u32..).zip(self.labels.iter()).map(move |(i, &label)| (i % width, i / width, label))
    }
}

/// Parameters handed unmodified to the oversegmentation stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Scale of the merge threshold `scale / |C|`. Higher values give
    /// larger segments.
    pub scale: f32,

    /// Sigma of the Gaussian pre-smoothing. Zero disables it.
    pub sigma: f32,

    /// Components smaller than this many pixels are merged into a
    /// neighbour after segmentation.
    pub min_size: u32,
}

impl SegmentationConfig {
    /// Default threshold scale.
    pub const DEFAULT_SCALE: f32 = 500.0;
    /// Default pre-smoothing sigma.
    pub const DEFAULT_SIGMA: f32 = 0.9;
    /// Default minimum component size.
    pub const DEFAULT_MIN_SIZE: u32 = 5;
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            scale: Self::DEFAULT_SCALE,
            sigma: Self::DEFAULT_SIGMA,
            min_size: Self::DEFAULT_MIN_SIZE,
        }
    }
}

/// Configuration for a selective search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Side length of the square working image. The input is resized to
    /// `working_resolution x working_resolution` before segmentation.
    pub working_resolution: u32,

    /// Resampling filter for the working-resolution resize.
    pub resize_filter: ResizeFilter,

    /// Oversegmentation parameters.
    pub segmentation: SegmentationConfig,

    /// Per-pixel texture descriptor feeding the texture histograms.
    pub texture: TextureDescriptorKind,

    /// Rule deciding which initial regions share a similarity edge.
    pub adjacency: AdjacencyKind,

    /// Stop after this many merges. `None` runs the hierarchy to completion.
    pub max_merges: Option<usize>,
}

impl SearchConfig {
    /// Default working resolution in pixels.
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 256;
    /// Default resampling filter.
    pub const DEFAULT_RESIZE_FILTER: ResizeFilter = ResizeFilter::Triangle;

    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.working_resolution == 0 {
            return Err(SearchError::InvalidConfig(
                "working_resolution must be at least 1".to_string(),
            ));
        }
        let seg = &self.segmentation;
        if !seg.scale.is_finite() || seg.scale < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "segmentation scale must be finite and non-negative, got {}",
                seg.scale,
            )));
        }
        if !seg.sigma.is_finite() || seg.sigma < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "segmentation sigma must be finite and non-negative, got {}",
                seg.sigma,
            )));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            resize_filter: Self::DEFAULT_RESIZE_FILTER,
            segmentation: SegmentationConfig::default(),
            texture: TextureDescriptorKind::default(),
            adjacency: AdjacencyKind::default(),
            max_merges: None,
        }
    }
}

/// Result of a selective search run: the whole region hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Every region ever formed, originals and merge products, by id.
    pub regions: BTreeMap<RegionId, Region>,

    /// Merges in the order they were performed.
    pub merges: Vec<MergeStep>,

    /// Number of regions produced by the segmentation.
    pub initial_region_count: usize,

    /// Dimensions of the working image the regions refer to.
    pub dimensions: Dimensions,
}

impl SearchResult {
    /// Number of regions in the hierarchy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if the hierarchy holds no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Look up a region by id.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// Regions never consumed by a merge, in id order.
    ///
    /// One root per connected component of the initial adjacency graph
    /// (more if the run stopped at a merge budget).
    pub fn roots(&self) -> impl Iterator<Item = &Region> + '_ {
        let consumed: std::collections::BTreeSet<RegionId> = self
            .merges
            .iter()
            .flat_map(|step| [step.left, step.right])
            .collect();
        self.regions
            .values()
            .filter(move |region| !consumed.contains(&region.id()))
    }
}

/// Errors that can occur during selective search.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Inputs are inconsistent (e.g. label map and image sizes differ).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Search configuration is invalid.
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),

    /// A merge product was assigned an id that is already taken.
    #[error("region id {0} is already in use")]
    IdConflict(RegionId),

    /// Two regions carry histograms of different lengths.
    #[error("histogram length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Length of the first region's histogram.
        expected: usize,
        /// Length of the second region's histogram.
        actual: usize,
    },
}

/// Serde-compatible proxy for `SearchError`.
#[derive(Serialize, Deserialize)]
enum SearchErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidInput(String),
    InvalidConfig(String),
    IdConflict(RegionId),
    ShapeMismatch { expected: usize, actual: usize },
}

impl Serialize for SearchError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => SearchErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => SearchErrorProxy::EmptyInput,
            Self::InvalidInput(s) => SearchErrorProxy::InvalidInput(s.clone()),
            Self::InvalidConfig(s) => SearchErrorProxy::InvalidConfig(s.clone()),
            Self::IdConflict(id) => SearchErrorProxy::IdConflict(*id),
            Self::ShapeMismatch { expected, actual } => SearchErrorProxy::ShapeMismatch {
                expected: *expected,
                actual: *actual,
            },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SearchError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = SearchErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image::ImageError cannot be rebuilt; keep its message.
            SearchErrorProxy::ImageDecode(msg) => {
                Self::InvalidInput(format!("image decode error: {msg}"))
            }
            SearchErrorProxy::EmptyInput => Self::EmptyInput,
            SearchErrorProxy::InvalidInput(s) => Self::InvalidInput(s),
            SearchErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            SearchErrorProxy::IdConflict(id) => Self::IdConflict(id),
            SearchErrorProxy::ShapeMismatch { expected, actual } => {
                Self::ShapeMismatch { expected, actual }
            }
        })
    }
}
