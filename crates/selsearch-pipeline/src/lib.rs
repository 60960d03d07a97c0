//! selsearch-pipeline: Hierarchical region merging for object proposals (sans-IO).
//!
//! Generates candidate object regions from a single image through:
//! decode -> resize -> oversegmentation -> texture + HSV maps ->
//! region extraction -> adjacency -> greedy similarity merging.
//!
//! Every region ever formed is kept, so a segmentation with `n` labels in
//! one connected component yields `2n - 1` regions. Each region's
//! bounding box is a candidate object location; see [`proposals`].
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and images and returns structured data.

pub mod adjacency;
pub mod blur;
pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod extract;
pub mod merge;
pub mod proposals;
pub mod resize;
pub mod segment;
pub mod similarity;
pub mod texture;
pub mod types;

pub use adjacency::{AdjacencyKind, AdjacencyRule};
pub use merge::{MergeState, MergeStep};
pub use proposals::{Proposal, ProposalFilter, proposals};
pub use resize::ResizeFilter;
pub use segment::{Felzenszwalb, Segmenter};
pub use texture::{TextureDescriptor, TextureDescriptorKind};
pub use types::{
    BoundingBox, Dimensions, LabelMap, Rect, Region, RegionId, RgbImage, SearchConfig,
    SearchError, SearchResult, SegmentationConfig,
};

/// Run selective search on encoded image bytes.
///
/// # Pipeline steps
///
/// 1. Decode the image to 8-bit RGB
/// 2. Resize to the square working resolution
/// 3. Felzenszwalb oversegmentation
/// 4. Texture map and HSV conversion
/// 5. Region extraction (bounding boxes, sizes, histograms)
/// 6. Bounding-box adjacency
/// 7. Greedy hierarchical merging
///
/// # Errors
///
/// Returns [`SearchError::InvalidConfig`] if `config` fails validation,
/// [`SearchError::EmptyInput`] if `image_bytes` is empty, and
/// [`SearchError::ImageDecode`] if the format is unrecognized.
pub fn search(image_bytes: &[u8], config: &SearchConfig) -> Result<SearchResult, SearchError> {
    config.validate()?;
    let image = decode::decode(image_bytes)?;
    search_image(&image, config)
}

/// Run selective search on an in-memory image.
///
/// Steps 2 to 7 of [`search`].
///
/// # Errors
///
/// Returns [`SearchError::InvalidConfig`] if `config` fails validation.
pub fn search_image(image: &RgbImage, config: &SearchConfig) -> Result<SearchResult, SearchError> {
    config.validate()?;
    let (working, _) =
        resize::resize_square(image, config.working_resolution, config.resize_filter);
    let labels = Felzenszwalb::new(config.segmentation).segment(&working);
    search_with(&working, &labels, &config.texture, config)
}

/// Build the region hierarchy from a caller-supplied segmentation.
///
/// `labels` must have the same dimensions as `image`. Labels need not be
/// dense; each distinct label becomes one initial region whose id is the
/// label itself. The working resolution and segmentation settings of
/// `config` are ignored.
///
/// # Errors
///
/// Returns [`SearchError::InvalidInput`] if `labels` and `image` differ
/// in size.
pub fn search_with(
    image: &RgbImage,
    labels: &LabelMap,
    texture: &dyn TextureDescriptor,
    config: &SearchConfig,
) -> Result<SearchResult, SearchError> {
    let texture_map = texture.describe(image);
    let hsv = color::rgb_to_hsv(image);
    let regions = extract::extract_regions(labels, &hsv, &texture_map)?;
    let initial_region_count = regions.len();

    let pairs = adjacency::adjacent_pairs(&regions, &config.adjacency);
    let dimensions = labels.dimensions();
    let (regions, merges) = merge::hierarchical_merge(
        regions,
        &pairs,
        dimensions.pixel_count(),
        config.max_merges,
    )?;

    Ok(SearchResult {
        regions,
        merges,
        initial_region_count,
        dimensions,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Encode an RGB image as PNG bytes.
    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    /// Four flat quadrants of distinct colors.
    fn quadrants(side: u32) -> RgbImage {
        let colors = [[200, 30, 30], [30, 200, 30], [30, 30, 200], [220, 220, 40]];
        RgbImage::from_fn(side, side, |x, y| {
            let q = usize::from(x >= side / 2) + 2 * usize::from(y >= side / 2);
            Rgb(colors[q])
        })
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            working_resolution: 32,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn search_empty_input() {
        let result = search(&[], &SearchConfig::default());
        assert!(matches!(result, Err(SearchError::EmptyInput)));
    }

    #[test]
    fn search_invalid_image() {
        let result = search(&[0xde, 0xad, 0xbe, 0xef], &SearchConfig::default());
        assert!(matches!(result, Err(SearchError::ImageDecode(_))));
    }

    #[test]
    fn search_invalid_config_is_checked_before_decoding() {
        let config = SearchConfig {
            working_resolution: 0,
            ..SearchConfig::default()
        };
        let result = search(&[], &config);
        assert!(matches!(result, Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn search_png_builds_full_hierarchy() {
        let png = encode_png(&quadrants(16));
        let result = search(&png, &small_config()).unwrap();

        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 32,
                height: 32
            }
        );
        assert!(result.initial_region_count >= 1);
        assert_eq!(result.len(), 2 * result.initial_region_count - 1);
        assert_eq!(result.merges.len(), result.initial_region_count - 1);
        assert_eq!(result.roots().count(), 1);
        let root = result.roots().next().unwrap();
        assert_eq!(root.size(), 32 * 32);
        assert_eq!(root.bbox(), BoundingBox::new(0, 0, 31, 31));
    }

    #[test]
    fn search_with_two_by_two_singletons() {
        let image = RgbImage::from_fn(2, 2, |x, y| {
            Rgb([u8::try_from(x * 100 + y * 50).unwrap(), 0, 0])
        });
        let labels = LabelMap::from_raw(2, 2, vec![0, 1, 2, 3]).unwrap();
        let result = search_with(
            &image,
            &labels,
            &TextureDescriptorKind::LocalBinaryPattern,
            &SearchConfig::default(),
        )
        .unwrap();

        assert_eq!(result.initial_region_count, 4);
        assert_eq!(result.len(), 7);
        assert_eq!(result.merges.len(), 3);
        let last = result.region(result.merges[2].merged).unwrap();
        assert_eq!(last.bbox(), BoundingBox::new(0, 0, 1, 1));
        assert_eq!(last.size(), 4);
    }

    #[test]
    fn search_with_single_label_has_no_merges() {
        let image = RgbImage::from_pixel(5, 3, Rgb([10, 20, 30]));
        let labels = LabelMap::from_fn(5, 3, |_, _| 0);
        let result = search_with(
            &image,
            &labels,
            &TextureDescriptorKind::default(),
            &SearchConfig::default(),
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.merges.is_empty());
    }

    #[test]
    fn search_with_rejects_mismatched_labels() {
        let image = RgbImage::new(4, 4);
        let labels = LabelMap::from_fn(3, 4, |_, _| 0);
        let result = search_with(
            &image,
            &labels,
            &TextureDescriptorKind::default(),
            &SearchConfig::default(),
        );
        assert!(matches!(result, Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn search_image_of_empty_image_is_empty() {
        let config = SearchConfig {
            resize_filter: ResizeFilter::Disabled,
            ..SearchConfig::default()
        };
        let result = search_image(&RgbImage::new(0, 0), &config).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.initial_region_count, 0);
    }

    #[test]
    fn merge_budget_limits_hierarchy() {
        let image = RgbImage::from_fn(4, 1, |x, _| Rgb([u8::try_from(x * 60).unwrap(), 0, 0]));
        let labels = LabelMap::from_raw(4, 1, vec![0, 1, 2, 3]).unwrap();
        let config = SearchConfig {
            max_merges: Some(1),
            ..SearchConfig::default()
        };
        let result = search_with(&image, &labels, &config.texture, &config).unwrap();
        assert_eq!(result.merges.len(), 1);
        assert_eq!(result.len(), 5);
        assert_eq!(result.roots().count(), 3);
    }

    #[test]
    fn search_is_deterministic() {
        let png = encode_png(&quadrants(24));
        let a = search(&png, &small_config()).unwrap();
        let b = search(&png, &small_config()).unwrap();
        assert_eq!(a, b);
    }
}
