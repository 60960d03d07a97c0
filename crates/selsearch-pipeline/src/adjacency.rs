//! Adjacency: which initial regions share a similarity edge.
//!
//! This module defines the [`AdjacencyRule`] trait for pluggable
//! bounding-box neighbourhood tests and the [`AdjacencyKind`] enum for
//! selecting one at runtime.
//!
//! Both rules look only at bounding boxes, not at pixel contact. An
//! R\*-tree over the boxes limits the pairs that are tested; the output
//! matches an all-pairs scan.

use std::collections::BTreeMap;

use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Region, RegionId};

/// Selects which adjacency rule to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdjacencyKind {
    /// Boxes overlap or touch, diagonally included.
    ///
    /// Symmetric. Two single-pixel regions that are 8-neighbours are
    /// adjacent.
    #[default]
    Touching,

    /// Classic corner-containment test.
    ///
    /// A pair `(a, b)` with `a < b` is adjacent when a corner of `b`
    /// lies strictly inside `a` on both axes, checking `(min_x, min_y)`,
    /// `(max_x, max_y)` and `(min_x, max_y)`. The `(max_x, min_y)`
    /// corner is never tested. Boxes of single-pixel width or height
    /// can never contain a corner, so small regions may end up with no
    /// edges at all.
    CornerContainment,
}

/// Trait for bounding-box adjacency tests.
pub trait AdjacencyRule {
    /// Whether the region boxed by `lower` (the smaller id) and the one
    /// boxed by `higher` get an edge.
    fn adjacent(&self, lower: &BoundingBox, higher: &BoundingBox) -> bool;

    /// Largest pixel gap between two boxes this rule can still accept.
    ///
    /// `Some(n)` promises that boxes more than `n` pixels apart on either
    /// axis are never adjacent, which lets [`adjacent_pairs`] query an
    /// R\*-tree. `None` (the default) means no such bound, and every
    /// pair is tested.
    fn reach(&self) -> Option<u32> {
        None
    }
}

impl AdjacencyRule for AdjacencyKind {
    fn reach(&self) -> Option<u32> {
        match *self {
            Self::Touching => Some(1),
            Self::CornerContainment => Some(0),
        }
    }

    fn adjacent(&self, lower: &BoundingBox, higher: &BoundingBox) -> bool {
        match *self {
            Self::Touching => boxes_touch(lower, higher),
            Self::CornerContainment => corner_contained(lower, higher),
        }
    }
}

/// Closed boxes grown by one pixel intersect.
fn boxes_touch(a: &BoundingBox, b: &BoundingBox) -> bool {
    let (a_min_x, a_max_x) = (i64::from(a.min_x), i64::from(a.max_x));
    let (a_min_y, a_max_y) = (i64::from(a.min_y), i64::from(a.max_y));
    let (b_min_x, b_max_x) = (i64::from(b.min_x), i64::from(b.max_x));
    let (b_min_y, b_max_y) = (i64::from(b.min_y), i64::from(b.max_y));

    a_min_x <= b_max_x + 1 && b_min_x <= a_max_x + 1 && a_min_y <= b_max_y + 1 && b_min_y <= a_max_y + 1
}

/// `lo < v < hi`.
const fn strictly_between(lo: u32, v: u32, hi: u32) -> bool {
    lo < v && v < hi
}

/// Literal corner-containment test, duplicated condition included.
#[allow(clippy::nonminimal_bool)]
const fn corner_contained(a: &BoundingBox, b: &BoundingBox) -> bool {
    let min_x_inside = strictly_between(a.min_x, b.min_x, a.max_x);
    let max_x_inside = strictly_between(a.min_x, b.max_x, a.max_x);
    let min_y_inside = strictly_between(a.min_y, b.min_y, a.max_y);
    let max_y_inside = strictly_between(a.min_y, b.max_y, a.max_y);

    (min_x_inside && min_y_inside)
        || (max_x_inside && max_y_inside)
        || (min_x_inside && max_y_inside)
        || (min_x_inside && max_y_inside)
}

/// A region box stored in the R\*-tree.
struct IndexedBox {
    id: RegionId,
    bbox: BoundingBox,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [i64::from(self.bbox.min_x), i64::from(self.bbox.min_y)],
            [i64::from(self.bbox.max_x), i64::from(self.bbox.max_y)],
        )
    }
}

/// Query envelope: `bbox` grown by `reach` pixels on every side.
fn grown_envelope(bbox: &BoundingBox, reach: u32) -> AABB<[i64; 2]> {
    let reach = i64::from(reach);
    AABB::from_corners(
        [i64::from(bbox.min_x) - reach, i64::from(bbox.min_y) - reach],
        [i64::from(bbox.max_x) + reach, i64::from(bbox.max_y) + reach],
    )
}

/// All adjacent region pairs under `rule`, as `(lower, higher)` ids in
/// ascending order.
///
/// Rules with a [`reach`](AdjacencyRule::reach) draw candidates from an
/// R\*-tree; rules without one fall back to testing every pair.
#[must_use]
pub fn adjacent_pairs(
    regions: &BTreeMap<RegionId, Region>,
    rule: &impl AdjacencyRule,
) -> Vec<(RegionId, RegionId)> {
    let pairs = match rule.reach() {
        Some(reach) => indexed_pairs(regions, rule, reach),
        None => all_pairs(regions, rule),
    };

    log::debug!(
        "{} adjacent pairs among {} regions",
        pairs.len(),
        regions.len()
    );

    pairs
}

/// Every pair tested against `rule`. Already in ascending order.
fn all_pairs(
    regions: &BTreeMap<RegionId, Region>,
    rule: &impl AdjacencyRule,
) -> Vec<(RegionId, RegionId)> {
    let all: Vec<&Region> = regions.values().collect();
    let mut pairs = Vec::new();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            if rule.adjacent(&a.bbox(), &b.bbox()) {
                pairs.push((a.id(), b.id()));
            }
        }
    }
    pairs
}

/// Pairs among R\*-tree candidates within `reach` pixels.
fn indexed_pairs(
    regions: &BTreeMap<RegionId, Region>,
    rule: &impl AdjacencyRule,
    reach: u32,
) -> Vec<(RegionId, RegionId)> {
    let tree = RTree::bulk_load(
        regions
            .values()
            .map(|r| IndexedBox {
                id: r.id(),
                bbox: r.bbox(),
            })
            .collect(),
    );

    let mut pairs = Vec::new();
    for region in regions.values() {
        let bbox = region.bbox();
        for candidate in tree.locate_in_envelope_intersecting(&grown_envelope(&bbox, reach)) {
            if candidate.id > region.id() && rule.adjacent(&bbox, &candidate.bbox) {
                pairs.push((region.id(), candidate.id));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}
