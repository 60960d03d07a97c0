//! Candidate rectangles from a finished hierarchy.
//!
//! Every region of a [`SearchResult`] is a candidate object location.
//! [`proposals`] flattens the hierarchy into rectangles, dropping
//! duplicates and applying optional size and shape filters.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{Rect, RegionId, SearchResult};

/// A candidate object rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Region the rectangle was taken from.
    pub region: RegionId,
    /// Bounding rectangle in working-image pixels.
    pub rect: Rect,
    /// Pixel count of the region.
    pub size: u64,
    /// Original segmentation labels covered by the region.
    pub member_labels: Vec<u32>,
}

/// Filters applied by [`proposals`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProposalFilter {
    /// Drop regions with fewer pixels than this.
    pub min_size: u64,

    /// Drop rectangles whose longer side exceeds the shorter side by more
    /// than this factor. `None` keeps every shape.
    pub max_aspect_ratio: Option<f64>,
}

impl ProposalFilter {
    fn accepts(&self, rect: &Rect, size: u64) -> bool {
        if size < self.min_size {
            return false;
        }
        self.max_aspect_ratio.is_none_or(|max| {
            let (long, short) = if rect.width >= rect.height {
                (rect.width, rect.height)
            } else {
                (rect.height, rect.width)
            };
            f64::from(long) / f64::from(short) <= max
        })
    }
}

/// Candidate rectangles in region-id order.
///
/// A rectangle already produced by a lower-id region is skipped, so each
/// rectangle appears once and carries the first region that had it.
#[must_use]
pub fn proposals(result: &SearchResult, filter: &ProposalFilter) -> Vec<Proposal> {
    let mut seen = HashSet::new();
    let out: Vec<Proposal> = result
        .regions
        .values()
        .filter(|region| filter.accepts(&region.rect(), region.size()))
        .filter(|region| seen.insert(region.rect()))
        .map(|region| Proposal {
            region: region.id(),
            rect: region.rect(),
            size: region.size(),
            member_labels: region.member_labels().to_vec(),
        })
        .collect();

    log::debug!(
        "{} proposals from {} regions",
        out.len(),
        result.regions.len()
    );

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extract::extract_regions;
    use crate::merge::hierarchical_merge;
    use crate::types::{Dimensions, LabelMap, Rgb32FImage};

    /// Full hierarchy of a 4x1 strip with labels `[0, 0, 1, 2]`.
    fn strip() -> SearchResult {
        let labels = LabelMap::from_raw(4, 1, vec![0, 0, 1, 2]).unwrap();
        let zeros = Rgb32FImage::new(4, 1);
        let regions = extract_regions(&labels, &zeros, &zeros).unwrap();
        let pairs = crate::adjacency::adjacent_pairs(
            &regions,
            &crate::adjacency::AdjacencyKind::Touching,
        );
        let (regions, merges) = hierarchical_merge(regions, &pairs, 4, None).unwrap();
        SearchResult {
            regions,
            merges,
            initial_region_count: 3,
            dimensions: Dimensions {
                width: 4,
                height: 1,
            },
        }
    }

    #[test]
    fn every_distinct_rect_is_proposed_once() {
        let result = strip();
        assert_eq!(result.len(), 5);
        let props = proposals(&result, &ProposalFilter::default());
        assert_eq!(props.len(), 5);
        let ids: Vec<u64> = props.iter().map(|p| p.region.get()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            props[0].rect,
            Rect {
                x: 0,
                y: 0,
                width: 2,
                height: 1
            }
        );
    }

    #[test]
    fn duplicate_rect_keeps_first_region() {
        // Label 1 is enclosed by label 0; merging them repeats label 0's box.
        let labels = LabelMap::from_fn(3, 3, |x, y| u32::from((x, y) == (1, 1)));
        let zeros = Rgb32FImage::new(3, 3);
        let regions = extract_regions(&labels, &zeros, &zeros).unwrap();
        let pairs = vec![(RegionId::new(0), RegionId::new(1))];
        let (regions, merges) = hierarchical_merge(regions, &pairs, 9, None).unwrap();
        let result = SearchResult {
            regions,
            merges,
            initial_region_count: 2,
            dimensions: Dimensions {
                width: 3,
                height: 3,
            },
        };

        let props = proposals(&result, &ProposalFilter::default());
        let ids: Vec<u64> = props.iter().map(|p| p.region.get()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn min_size_drops_small_regions() {
        let filter = ProposalFilter {
            min_size: 2,
            ..ProposalFilter::default()
        };
        let props = proposals(&strip(), &filter);
        assert!(props.iter().all(|p| p.size >= 2));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn aspect_ratio_drops_elongated_rects() {
        let filter = ProposalFilter {
            min_size: 0,
            max_aspect_ratio: Some(2.0),
        };
        let props = proposals(&strip(), &filter);
        // Only the 1x1 and 2x1 rectangles survive.
        assert!(props.iter().all(|p| p.rect.width <= 2));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn empty_result_has_no_proposals() {
        let result = SearchResult {
            regions: std::collections::BTreeMap::new(),
            merges: Vec::new(),
            initial_region_count: 0,
            dimensions: Dimensions {
                width: 0,
                height: 0,
            },
        };
        assert!(proposals(&result, &ProposalFilter::default()).is_empty());
    }
}
