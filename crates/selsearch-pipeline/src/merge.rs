//! Hierarchical merge driver.
//!
//! [`MergeState`] owns every region formed so far and the set of live
//! similarity edges. Each [`step`](MergeState::step) merges the
//! best-scoring pair into a new region, retires every edge touching the
//! two parents, and links the new region to the parents' former
//! neighbours. Parents stay in the region map: the whole hierarchy is
//! the result.
//!
//! # Edge order
//!
//! Edges are totally ordered by score descending, then by
//! `(low id, high id)` ascending. The best edge is picked from a
//! max-heap whose stale entries (edges retired by an earlier merge) are
//! discarded lazily; the order matches a linear scan of the live edges.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::similarity;
use crate::types::{Region, RegionId, SearchError};

/// Unordered pair of region ids, stored lower id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    low: RegionId,
    high: RegionId,
}

impl EdgeKey {
    /// Key for the pair `{a, b}` in either order.
    #[must_use]
    pub fn new(a: RegionId, b: RegionId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// The smaller id.
    #[must_use]
    pub const fn low(self) -> RegionId {
        self.low
    }

    /// The larger id.
    #[must_use]
    pub const fn high(self) -> RegionId {
        self.high
    }
}

/// Record of a single merge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeStep {
    /// Lower-id parent.
    pub left: RegionId,
    /// Higher-id parent.
    pub right: RegionId,
    /// Id of the merge product.
    pub merged: RegionId,
    /// Similarity score of the merged pair.
    pub score: f64,
}

/// Heap entry for a scored edge.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    key: EdgeKey,
}

impl Ord for Candidate {
    /// Higher score first; on equal scores the smaller pair wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Merge two regions into a new region with id `id`.
///
/// The box is the union of both boxes, the size the sum of sizes, the
/// histograms the size-weighted bin-wise average, and the member labels
/// `r1`'s followed by `r2`'s. Two empty regions give zero histograms.
///
/// # Errors
///
/// Returns [`SearchError::ShapeMismatch`] if the parents' histograms
/// differ in length.
pub fn merge_regions(r1: &Region, r2: &Region, id: RegionId) -> Result<Region, SearchError> {
    let size = r1.size() + r2.size();
    let color_hist = weighted_average(r1.color_hist(), r1.size(), r2.color_hist(), r2.size())?;
    let texture_hist =
        weighted_average(r1.texture_hist(), r1.size(), r2.texture_hist(), r2.size())?;

    let mut member_labels = Vec::with_capacity(r1.member_labels().len() + r2.member_labels().len());
    member_labels.extend_from_slice(r1.member_labels());
    member_labels.extend_from_slice(r2.member_labels());

    Ok(Region::from_parts(
        id,
        r1.bbox().union(&r2.bbox()),
        size,
        color_hist,
        texture_hist,
        member_labels,
    ))
}

/// Bin-wise `(a * wa + b * wb) / (wa + wb)`; all-zero when both weights are 0.
#[allow(clippy::cast_precision_loss)]
fn weighted_average(a: &[f64], wa: u64, b: &[f64], wb: u64) -> Result<Vec<f64>, SearchError> {
    if a.len() != b.len() {
        return Err(SearchError::ShapeMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let total = wa + wb;
    if total == 0 {
        return Ok(vec![0.0; a.len()]);
    }
    let (wa, wb, total) = (wa as f64, wb as f64, total as f64);
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| x.mul_add(wa, y * wb) / total)
        .collect())
}

/// Region hierarchy under construction.
#[derive(Debug, Clone)]
pub struct MergeState {
    regions: BTreeMap<RegionId, Region>,
    edges: BTreeMap<EdgeKey, f64>,
    neighbours: BTreeMap<RegionId, BTreeSet<RegionId>>,
    queue: BinaryHeap<Candidate>,
    next_id: RegionId,
    image_size: u64,
    history: Vec<MergeStep>,
}

impl MergeState {
    /// Seed the state with the initial regions and their adjacent pairs.
    ///
    /// Every pair is scored against an image of `image_size` pixels.
    /// Duplicate pairs and self-pairs are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidInput`] if a pair names an unknown
    /// region, or [`SearchError::ShapeMismatch`] if two regions'
    /// histograms differ in length.
    pub fn new(
        regions: BTreeMap<RegionId, Region>,
        pairs: &[(RegionId, RegionId)],
        image_size: u64,
    ) -> Result<Self, SearchError> {
        let next_id = regions
            .keys()
            .next_back()
            .map_or(RegionId::new(0), |max| max.next());

        let mut state = Self {
            regions,
            edges: BTreeMap::new(),
            neighbours: BTreeMap::new(),
            queue: BinaryHeap::with_capacity(pairs.len()),
            next_id,
            image_size,
            history: Vec::new(),
        };

        for &(a, b) in pairs {
            if a == b {
                continue;
            }
            let score = similarity::score(state.region(a)?, state.region(b)?, image_size)?;
            state.insert_edge(EdgeKey::new(a, b), score);
        }

        log::debug!(
            "merge state seeded with {} regions and {} edges",
            state.regions.len(),
            state.edges.len(),
        );

        Ok(state)
    }

    /// Every region formed so far, originals included.
    #[must_use]
    pub const fn regions(&self) -> &BTreeMap<RegionId, Region> {
        &self.regions
    }

    /// Live similarity edges and their scores.
    #[must_use]
    pub const fn edges(&self) -> &BTreeMap<EdgeKey, f64> {
        &self.edges
    }

    /// Merges performed so far, in order.
    #[must_use]
    pub fn history(&self) -> &[MergeStep] {
        &self.history
    }

    /// Returns `true` once no edges remain.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.edges.is_empty()
    }

    /// Look up a region, failing on an id the state does not hold.
    fn region(&self, id: RegionId) -> Result<&Region, SearchError> {
        self.regions
            .get(&id)
            .ok_or_else(|| SearchError::InvalidInput(format!("unknown region id {id}")))
    }

    fn insert_edge(&mut self, key: EdgeKey, score: f64) {
        if self.edges.insert(key, score).is_none() {
            self.neighbours.entry(key.low).or_default().insert(key.high);
            self.neighbours.entry(key.high).or_default().insert(key.low);
        }
        self.queue.push(Candidate { score, key });
    }

    /// The live edge that the next step will merge.
    ///
    /// Stale heap entries encountered on the way are dropped. An edge key
    /// is never re-inserted after removal because merge products always
    /// get fresh ids, so presence in the edge map is enough to tell a
    /// live entry from a stale one.
    pub fn best_edge(&mut self) -> Option<(EdgeKey, f64)> {
        while let Some(top) = self.queue.peek() {
            if let Some(&score) = self.edges.get(&top.key) {
                return Some((top.key, score));
            }
            self.queue.pop();
        }
        None
    }

    /// Merge the best pair. Returns `Ok(None)` when no edges remain.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::IdConflict`] if the new id is already taken
    /// and [`SearchError::ShapeMismatch`] if histogram lengths disagree.
    pub fn step(&mut self) -> Result<Option<MergeStep>, SearchError> {
        let Some((key, score)) = self.best_edge() else {
            return Ok(None);
        };
        let (left, right) = (key.low, key.high);
        let merged_id = self.next_id;

        let merged = merge_regions(self.region(left)?, self.region(right)?, merged_id)?;
        match self.regions.entry(merged_id) {
            Entry::Occupied(_) => return Err(SearchError::IdConflict(merged_id)),
            Entry::Vacant(slot) => {
                slot.insert(merged);
            }
        }
        self.next_id = merged_id.next();

        // Retire every edge of both parents, remembering the far ends.
        let mut former_neighbours = BTreeSet::new();
        for parent in [left, right] {
            for n in self.neighbours.remove(&parent).unwrap_or_default() {
                self.edges.remove(&EdgeKey::new(parent, n));
                if let Some(back) = self.neighbours.get_mut(&n) {
                    back.remove(&parent);
                }
                if n != left && n != right {
                    former_neighbours.insert(n);
                }
            }
        }

        let merged_region = self.region(merged_id)?;
        let new_edges = former_neighbours
            .into_iter()
            .map(|n| -> Result<(EdgeKey, f64), SearchError> {
                let s = similarity::score(merged_region, self.region(n)?, self.image_size)?;
                Ok((EdgeKey::new(merged_id, n), s))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (edge, s) in new_edges {
            self.insert_edge(edge, s);
        }

        let step = MergeStep {
            left,
            right,
            merged: merged_id,
            score,
        };
        log::trace!(
            "merged {left} + {right} -> {merged_id} (score {score:.4}, {} edges left)",
            self.edges.len(),
        );
        self.history.push(step);
        Ok(Some(step))
    }

    /// Merge until no edges remain or `max_merges` merges have been made
    /// by this call. Returns the number of merges performed.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`step`](Self::step).
    pub fn run(&mut self, max_merges: Option<usize>) -> Result<usize, SearchError> {
        let limit = max_merges.unwrap_or(usize::MAX);
        let mut performed = 0;
        while performed < limit {
            if self.step()?.is_none() {
                break;
            }
            performed += 1;
        }
        log::debug!(
            "performed {performed} merges, {} regions in hierarchy",
            self.regions.len()
        );
        Ok(performed)
    }

    /// Consume the state, returning all regions and the merge history.
    #[must_use]
    pub fn into_parts(self) -> (BTreeMap<RegionId, Region>, Vec<MergeStep>) {
        (self.regions, self.history)
    }
}

/// Build the full hierarchy from initial regions and their adjacent pairs.
///
/// # Errors
///
/// See [`MergeState::new`] and [`MergeState::step`].
pub fn hierarchical_merge(
    regions: BTreeMap<RegionId, Region>,
    pairs: &[(RegionId, RegionId)],
    image_size: u64,
    max_merges: Option<usize>,
) -> Result<(BTreeMap<RegionId, Region>, Vec<MergeStep>), SearchError> {
    let mut state = MergeState::new(regions, pairs, image_size)?;
    state.run(max_merges)?;
    Ok(state.into_parts())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, COLOR_HIST_LEN, TEXTURE_HIST_LEN};

    fn spike(len: usize, bin: usize) -> Vec<f64> {
        let mut hist = vec![0.0; len];
        hist[bin] = 1.0;
        hist
    }

    fn region(id: u32, bbox: BoundingBox, size: u64, color_bin: usize) -> Region {
        Region::from_parts(
            RegionId::from(id),
            bbox,
            size,
            spike(COLOR_HIST_LEN, color_bin),
            spike(TEXTURE_HIST_LEN, 0),
            vec![id],
        )
    }

    fn id(raw: u64) -> RegionId {
        RegionId::new(raw)
    }

    fn map(regions: Vec<Region>) -> BTreeMap<RegionId, Region> {
        regions.into_iter().map(|r| (r.id(), r)).collect()
    }

    /// Four single pixels of a 2x2 image, fully connected.
    fn two_by_two() -> (BTreeMap<RegionId, Region>, Vec<(RegionId, RegionId)>) {
        let regions = map(vec![
            region(0, BoundingBox::from_pixel(0, 0), 1, 0),
            region(1, BoundingBox::from_pixel(1, 0), 1, 10),
            region(2, BoundingBox::from_pixel(0, 1), 1, 20),
            region(3, BoundingBox::from_pixel(1, 1), 1, 30),
        ]);
        let mut pairs = Vec::new();
        for a in 0..4 {
            for b in a + 1..4 {
                pairs.push((id(a), id(b)));
            }
        }
        (regions, pairs)
    }

    #[test]
    fn edge_key_is_unordered() {
        assert_eq!(EdgeKey::new(id(5), id(2)), EdgeKey::new(id(2), id(5)));
        assert_eq!(EdgeKey::new(id(5), id(2)).low(), id(2));
        assert_eq!(EdgeKey::new(id(5), id(2)).high(), id(5));
    }

    #[test]
    fn candidate_order_prefers_score_then_smaller_pair() {
        let high = Candidate {
            score: 2.0,
            key: EdgeKey::new(id(8), id(9)),
        };
        let low = Candidate {
            score: 1.0,
            key: EdgeKey::new(id(0), id(1)),
        };
        assert!(high > low);

        let small_pair = Candidate {
            score: 1.0,
            key: EdgeKey::new(id(0), id(2)),
        };
        let large_pair = Candidate {
            score: 1.0,
            key: EdgeKey::new(id(1), id(2)),
        };
        assert!(small_pair > large_pair);
    }

    #[test]
    fn merge_regions_combines_parts() {
        let a = region(0, BoundingBox::new(0, 0, 1, 1), 3, 0);
        let b = region(4, BoundingBox::new(2, 1, 5, 3), 1, 1);
        let merged = merge_regions(&a, &b, id(9)).unwrap();

        assert_eq!(merged.id(), id(9));
        assert_eq!(merged.bbox(), BoundingBox::new(0, 0, 5, 3));
        assert_eq!(merged.size(), 4);
        assert_eq!(merged.member_labels(), &[0, 4]);
        assert!(!merged.is_original());
        assert!((merged.color_hist()[0] - 0.75).abs() < 1e-12);
        assert!((merged.color_hist()[1] - 0.25).abs() < 1e-12);
        let total: f64 = merged.color_hist().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merging_empty_regions_gives_zero_histograms() {
        let empty = |n: u32| {
            Region::from_parts(
                RegionId::from(n),
                BoundingBox::from_pixel(0, 0),
                0,
                vec![0.0; COLOR_HIST_LEN],
                vec![0.0; TEXTURE_HIST_LEN],
                vec![n],
            )
        };
        let merged = merge_regions(&empty(0), &empty(1), id(2)).unwrap();
        assert_eq!(merged.size(), 0);
        assert!(merged.color_hist().iter().all(|&v| v == 0.0));
        assert!(merged.texture_hist().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn merge_regions_rejects_mismatched_histograms() {
        let a = region(0, BoundingBox::from_pixel(0, 0), 1, 0);
        let b = Region::from_parts(
            id(1),
            BoundingBox::from_pixel(1, 0),
            1,
            vec![1.0],
            spike(TEXTURE_HIST_LEN, 0),
            vec![1],
        );
        assert!(matches!(
            merge_regions(&a, &b, id(2)),
            Err(SearchError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn two_by_two_merges_into_full_image() {
        let (regions, pairs) = two_by_two();
        let (all, history) = hierarchical_merge(regions, &pairs, 4, None).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(all.len(), 7);
        let last = &all[&history[2].merged];
        assert_eq!(last.bbox(), BoundingBox::new(0, 0, 1, 1));
        assert_eq!(last.size(), 4);
        let mut labels = last.member_labels().to_vec();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn new_ids_continue_after_largest_label() {
        let regions = map(vec![
            region(3, BoundingBox::from_pixel(0, 0), 1, 0),
            region(40, BoundingBox::from_pixel(1, 0), 1, 0),
        ]);
        let (all, history) =
            hierarchical_merge(regions, &[(id(3), id(40))], 2, None).unwrap();
        assert_eq!(history[0].merged, id(41));
        assert!(all.contains_key(&id(41)));
    }

    #[test]
    fn equal_scores_merge_smallest_pair_first() {
        // A row of three identical pixels: (0,1) and (1,2) tie exactly.
        let regions = map(vec![
            region(0, BoundingBox::from_pixel(0, 0), 1, 0),
            region(1, BoundingBox::from_pixel(1, 0), 1, 0),
            region(2, BoundingBox::from_pixel(2, 0), 1, 0),
        ]);
        let mut state = MergeState::new(regions, &[(id(1), id(2)), (id(0), id(1))], 3).unwrap();
        let (best, _) = state.best_edge().unwrap();
        assert_eq!(best, EdgeKey::new(id(0), id(1)));

        let step = state.step().unwrap().unwrap();
        assert_eq!((step.left, step.right, step.merged), (id(0), id(1), id(3)));
    }

    #[test]
    fn merge_rewires_neighbours_to_product() {
        // 0 - 1 - 2 chain; merging (0,1) must link 3 with 2.
        let regions = map(vec![
            region(0, BoundingBox::from_pixel(0, 0), 1, 0),
            region(1, BoundingBox::from_pixel(1, 0), 1, 0),
            region(2, BoundingBox::from_pixel(2, 0), 1, 5),
        ]);
        let mut state = MergeState::new(regions, &[(id(0), id(1)), (id(1), id(2))], 3).unwrap();
        let step = state.step().unwrap().unwrap();
        assert_eq!((step.left, step.right), (id(0), id(1)));

        let keys: Vec<EdgeKey> = state.edges().keys().copied().collect();
        assert_eq!(keys, vec![EdgeKey::new(id(2), id(3))]);
        // Parents are kept in the hierarchy.
        assert_eq!(state.regions().len(), 4);
    }

    #[test]
    fn shared_neighbour_gets_a_single_edge() {
        let (regions, pairs) = two_by_two();
        let mut state = MergeState::new(regions, &pairs, 4).unwrap();
        let step = state.step().unwrap().unwrap();
        // The two remaining singletons each get one edge to the product,
        // plus the edge between themselves.
        assert_eq!(state.edges().len(), 3);
        assert!(
            state
                .edges()
                .keys()
                .filter(|k| k.high() == step.merged)
                .count()
                == 2
        );
    }

    #[test]
    fn disconnected_components_keep_separate_roots() {
        let regions = map(vec![
            region(0, BoundingBox::from_pixel(0, 0), 1, 0),
            region(1, BoundingBox::from_pixel(1, 0), 1, 0),
            region(2, BoundingBox::from_pixel(8, 8), 1, 0),
            region(3, BoundingBox::from_pixel(9, 8), 1, 0),
        ]);
        let (all, history) =
            hierarchical_merge(regions, &[(id(0), id(1)), (id(2), id(3))], 100, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn budget_stops_early() {
        let (regions, pairs) = two_by_two();
        let mut state = MergeState::new(regions, &pairs, 4).unwrap();
        assert_eq!(state.run(Some(2)).unwrap(), 2);
        assert!(!state.is_done());
        assert_eq!(state.run(None).unwrap(), 1);
        assert!(state.is_done());
        assert!(state.step().unwrap().is_none());
    }

    #[test]
    fn unknown_region_in_pairs_is_invalid_input() {
        let regions = map(vec![region(0, BoundingBox::from_pixel(0, 0), 1, 0)]);
        let result = MergeState::new(regions, &[(id(0), id(7))], 1);
        assert!(matches!(result, Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn reused_id_is_a_conflict() {
        let (regions, pairs) = two_by_two();
        let mut state = MergeState::new(regions, &pairs, 4).unwrap();
        state.next_id = id(2);
        assert!(matches!(
            state.step(),
            Err(SearchError::IdConflict(conflict)) if conflict == id(2)
        ));
    }

    #[test]
    fn heap_order_matches_linear_scan() {
        // A 4x4 grid of singletons with varied colors.
        let mut regions = Vec::new();
        for y in 0..4u32 {
            for x in 0..4u32 {
                let label = y * 4 + x;
                regions.push(region(
                    label,
                    BoundingBox::from_pixel(x, y),
                    1,
                    ((x * 7 + y * 3) % 5) as usize,
                ));
            }
        }
        let regions = map(regions);
        let pairs =
            crate::adjacency::adjacent_pairs(&regions, &crate::adjacency::AdjacencyKind::Touching);
        let mut state = MergeState::new(regions, &pairs, 16).unwrap();

        while !state.is_done() {
            let expected = state
                .edges()
                .iter()
                .map(|(&key, &score)| Candidate { score, key })
                .max()
                .unwrap();
            let step = state.step().unwrap().unwrap();
            assert_eq!((step.left, step.right), (expected.key.low(), expected.key.high()));
        }
        assert_eq!(state.history().len(), 15);
        assert_eq!(state.regions().len(), 31);
    }
}
