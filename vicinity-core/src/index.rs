use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::curve::{CurveMapper, GridPosition};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedNode {
    pub coord: Coordinate,
    pub curve_index: u64,
    pub grid_position: GridPosition,
}

impl MappedNode {
    pub fn map(coord: &Coordinate, mapper: &CurveMapper) -> Result<Self> {
        let (grid_position, curve_index) = mapper.map_coordinate(coord)?;
        Ok(Self {
            coord: coord.clone(),
            curve_index,
            grid_position,
        })
    }

    pub fn name(&self) -> &str {
        &self.coord.name
    }
}

/// Inclusive range of curve indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    pub lo: u64,
    pub hi: u64,
}

impl IndexRange {
    pub fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// `center ± radius`, saturating at 0 and `max`.
    pub fn around(center: u64, radius: u64, max: u64) -> Self {
        Self {
            lo: center.saturating_sub(radius),
            hi: center.saturating_add(radius).min(max),
        }
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.lo && index <= self.hi
    }

    pub fn width(&self) -> u64 {
        if self.hi < self.lo {
            0
        } else {
            self.hi - self.lo + 1
        }
    }
}

/// Coalesces overlapping and touching ranges. Inverted ranges are dropped.
pub fn merge_ranges(mut ranges: Vec<IndexRange>) -> Vec<IndexRange> {
    ranges.retain(|r| r.lo <= r.hi);
    ranges.sort_unstable();
    let mut out: Vec<IndexRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(cur) if r.lo <= cur.hi.saturating_add(1) => {
                cur.hi = cur.hi.max(r.hi);
            }
            _ => out.push(r),
        }
    }
    out
}

/// Nodes of one snapshot sorted by curve index.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    nodes: Vec<MappedNode>,
    positions: HashMap<String, usize>,
}

impl SpatialIndex {
    pub fn build(mut nodes: Vec<MappedNode>) -> Self {
        // stable: equal indices keep insertion order
        nodes.sort_by_key(|n| n.curve_index);
        let positions = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.coord.name.clone(), i))
            .collect();
        Self { nodes, positions }
    }

    pub fn from_coordinates<'a, I>(coords: I, mapper: &CurveMapper) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mapped = coords
            .into_iter()
            .map(|c| MappedNode::map(c, mapper))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::build(mapped))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[MappedNode] {
        &self.nodes
    }

    pub fn get(&self, name: &str) -> Option<&MappedNode> {
        self.positions.get(name).map(|&i| &self.nodes[i])
    }

    /// Position of `name` in curve order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn range_query(&self, lo: u64, hi: u64) -> &[MappedNode] {
        if lo > hi {
            return &[];
        }
        let left = self.nodes.partition_point(|n| n.curve_index < lo);
        let right = self.nodes.partition_point(|n| n.curve_index <= hi);
        &self.nodes[left..right]
    }

    pub fn multi_range_query(&self, ranges: &[IndexRange]) -> Vec<&MappedNode> {
        let merged = merge_ranges(ranges.to_vec());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for r in &merged {
            for node in self.range_query(r.lo, r.hi) {
                if seen.insert(node.name()) {
                    out.push(node);
                }
            }
        }
        out
    }

    /// Curve indices shared by more than one node, with the node names.
    pub fn duplicate_indices(&self) -> Vec<(u64, Vec<String>)> {
        let mut out: Vec<(u64, Vec<String>)> = Vec::new();
        for chunk in self.nodes.chunk_by(|a, b| a.curve_index == b.curve_index) {
            if chunk.len() > 1 {
                let names = chunk.iter().map(|n| n.coord.name.clone()).collect();
                out.push((chunk[0].curve_index, names));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, curve_index: u64) -> MappedNode {
        MappedNode {
            coord: Coordinate::new(name, vec![0.0, 0.0], 0.0),
            curve_index,
            grid_position: GridPosition::new(0, 0),
        }
    }

    fn sample_index() -> SpatialIndex {
        SpatialIndex::build(vec![
            node("e", 40),
            node("a", 3),
            node("c", 17),
            node("b", 9),
            node("d", 17),
            node("f", 41),
        ])
    }

    fn names(nodes: &[MappedNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name()).collect()
    }

    #[test]
    fn build_sorts_stably() {
        let idx = sample_index();
        assert_eq!(names(idx.nodes()), vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(idx.position("d"), Some(3));
        assert_eq!(idx.get("e").map(|n| n.curve_index), Some(40));
        assert!(idx.get("zz").is_none());
    }

    #[test]
    fn range_query_is_inclusive() {
        let idx = sample_index();
        assert_eq!(names(idx.range_query(9, 17)), vec!["b", "c", "d"]);
        assert_eq!(names(idx.range_query(10, 16)), Vec::<&str>::new());
        assert_eq!(names(idx.range_query(0, u64::MAX)).len(), 6);
        assert!(idx.range_query(20, 10).is_empty());
    }

    #[test]
    fn merge_ranges_coalesces_touching_and_overlapping() {
        let merged = merge_ranges(vec![
            IndexRange::new(10, 12),
            IndexRange::new(1, 3),
            IndexRange::new(4, 5),
            IndexRange::new(11, 20),
            IndexRange::new(30, 30),
            IndexRange::new(9, 2),
        ]);
        assert_eq!(
            merged,
            vec![
                IndexRange::new(1, 5),
                IndexRange::new(10, 20),
                IndexRange::new(30, 30)
            ]
        );
    }

    #[test]
    fn merge_ranges_handles_max_bound() {
        let merged = merge_ranges(vec![IndexRange::new(5, u64::MAX), IndexRange::new(7, 9)]);
        assert_eq!(merged, vec![IndexRange::new(5, u64::MAX)]);
    }

    #[test]
    fn multi_range_query_dedups() {
        let idx = sample_index();
        let found = idx.multi_range_query(&[
            IndexRange::new(0, 9),
            IndexRange::new(5, 17),
            IndexRange::new(41, 50),
        ]);
        let got: Vec<&str> = found.iter().map(|n| n.name()).collect();
        assert_eq!(got, vec!["a", "b", "c", "d", "f"]);
    }

    #[test]
    fn duplicates_are_reported() {
        let idx = sample_index();
        assert_eq!(
            idx.duplicate_indices(),
            vec![(17, vec!["c".to_string(), "d".to_string()])]
        );
    }

    #[test]
    fn around_saturates() {
        assert_eq!(IndexRange::around(3, 10, 255), IndexRange::new(0, 13));
        assert_eq!(IndexRange::around(250, 10, 255), IndexRange::new(240, 255));
        assert_eq!(IndexRange::new(4, 4).width(), 1);
        assert_eq!(IndexRange::new(5, 4).width(), 0);
    }
}
