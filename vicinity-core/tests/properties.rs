use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vicinity_core::{
    calibrate, estimate_rtt, merge_ranges, BoundingBox, Coordinate, CurveMapper, EngineConfig,
    GridPosition, IndexRange, MappedNode, QueryEngine, Snapshot, SpatialIndex,
};

fn arb_coord(dim: usize) -> impl Strategy<Value = Coordinate> {
    (
        prop::collection::vec(-0.5f64..0.5, dim),
        0.0f64..0.05,
        -0.05f64..0.05,
    )
        .prop_map(|(vector, height, adjustment)| {
            Coordinate::new("n", vector, height).with_adjustment(adjustment)
        })
}

fn arb_pair() -> impl Strategy<Value = (Coordinate, Coordinate)> {
    (1usize..9).prop_flat_map(|dim| (arb_coord(dim), arb_coord(dim)))
}

fn arb_population() -> impl Strategy<Value = Vec<Coordinate>> {
    prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0, 0.0f64..0.01), 2..60).prop_map(|pts| {
        pts.into_iter()
            .enumerate()
            .map(|(i, (x, y, h))| Coordinate::new(format!("n{i}"), vec![x, y], h))
            .collect()
    })
}

fn unit_mapper(order: u32) -> CurveMapper {
    let bounds = BoundingBox {
        min_x: 0.0,
        max_x: 1.0,
        min_y: 0.0,
        max_y: 1.0,
    };
    CurveMapper::new(bounds, order).unwrap()
}

proptest! {
    #[test]
    fn rtt_is_symmetric((a, b) in arb_pair()) {
        let ab = estimate_rtt(&a, &b).unwrap();
        let ba = estimate_rtt(&b, &a).unwrap();
        prop_assert!((ab - ba).abs() < 1e-9);
        prop_assert!(ab >= 0.0);
    }

    #[test]
    fn self_rtt_is_twice_height(mut a in (1usize..9).prop_flat_map(arb_coord)) {
        a.adjustment = 0.0;
        let rtt = estimate_rtt(&a, &a).unwrap();
        prop_assert!((rtt - 2.0 * a.height * 1000.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_adjusted_sum_keeps_height_floor((mut a, mut b) in arb_pair()) {
        a.adjustment = -10.0;
        b.adjustment = -10.0;
        let rtt = estimate_rtt(&a, &b).unwrap();
        prop_assert!(rtt >= (a.height + b.height) * 1000.0 - 1e-9);
    }

    #[test]
    fn curve_round_trips(order in 1u32..=16, fx in 0.0f64..1.0, fy in 0.0f64..1.0) {
        let m = unit_mapper(order);
        let pos = m.normalize(fx, fy);
        let d1 = m.map_to_index(pos).unwrap();
        let d2 = m.map_to_index(pos).unwrap();
        prop_assert_eq!(d1, d2);
        prop_assert!(d1 <= m.max_index());
        prop_assert_eq!(m.index_to_position(d1).unwrap(), pos);
    }

    #[test]
    fn merged_ranges_cover_the_same_indices(
        raw in prop::collection::vec((0u64..200, 0u64..20), 0..20)
    ) {
        let ranges: Vec<IndexRange> = raw
            .iter()
            .map(|&(lo, w)| IndexRange::new(lo, lo + w))
            .collect();
        let merged = merge_ranges(ranges.clone());
        for d in 0u64..230 {
            let before = ranges.iter().any(|r| r.contains(d));
            let after = merged.iter().any(|r| r.contains(d));
            prop_assert_eq!(before, after);
        }
        for pair in merged.windows(2) {
            prop_assert!(pair[0].hi + 1 < pair[1].lo);
        }
    }

    #[test]
    fn cutoffs_are_monotone(coords in arb_population(), reference in 0usize..60) {
        let snapshot = Snapshot::new(coords).unwrap();
        let reference = snapshot.coordinates()[reference % snapshot.len()].name.clone();
        let bounds = BoundingBox::from_coordinates(snapshot.coordinates(), 0.05).unwrap();
        let mapper = CurveMapper::new(bounds, 8).unwrap();
        let index = SpatialIndex::from_coordinates(snapshot.coordinates(), &mapper).unwrap();
        let thresholds: Vec<f64> = (1..=12).map(|i| f64::from(i) * 250.0).collect();
        let table =
            calibrate(&index, &reference, &thresholds, 0.95, snapshot.fingerprint()).unwrap();
        for pair in table.entries.windows(2) {
            prop_assert!(pair[0].threshold_ms < pair[1].threshold_ms);
            prop_assert!(pair[0].cutoff <= pair[1].cutoff);
        }
    }

    #[test]
    fn queries_never_return_false_positives(
        coords in arb_population(),
        budget in 100.0f64..3000.0
    ) {
        let snapshot = Arc::new(Snapshot::new(coords).unwrap());
        let cfg = EngineConfig {
            grid_order: 8,
            thresholds_ms: vec![100.0, 500.0, 1000.0, 2000.0],
            ..Default::default()
        };
        let engine = QueryEngine::build(snapshot.clone(), &cfg).unwrap();
        let reference = snapshot.coordinates()[0].name.clone();
        let table = engine.calibrate(&reference).unwrap();
        let truth: HashSet<String> = engine
            .exhaustive(&reference, budget)
            .unwrap()
            .neighbors
            .into_iter()
            .map(|n| n.name)
            .collect();
        if let Ok(res) = engine.query(&table, &reference, budget) {
            for n in &res.neighbors {
                prop_assert!(n.rtt_ms <= budget);
                prop_assert!(truth.contains(&n.name));
                prop_assert!(n.name != reference);
            }
        }
        let boxed: HashSet<String> = engine
            .query_box(&reference, budget)
            .unwrap()
            .neighbors
            .into_iter()
            .map(|n| n.name)
            .collect();
        prop_assert_eq!(boxed, truth);
    }
}

#[test]
fn range_query_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(7);
    let mapper = unit_mapper(10);
    let nodes: Vec<MappedNode> = (0..500)
        .map(|i| {
            let c = Coordinate::new(format!("n{i}"), vec![rng.gen(), rng.gen()], 0.0);
            MappedNode::map(&c, &mapper).unwrap()
        })
        .collect();
    let index = SpatialIndex::build(nodes.clone());

    for _ in 0..300 {
        let a = rng.gen_range(0..=mapper.max_index());
        let b = rng.gen_range(0..=mapper.max_index());
        let (lo, hi) = (a.min(b), a.max(b));
        let mut got: Vec<&str> = index.range_query(lo, hi).iter().map(|n| n.name()).collect();
        let mut want: Vec<&str> = nodes
            .iter()
            .filter(|n| n.curve_index >= lo && n.curve_index <= hi)
            .map(|n| n.name())
            .collect();
        got.sort_unstable();
        want.sort_unstable();
        assert_eq!(got, want, "range {lo}..={hi}");
    }
}

#[test]
fn multi_range_query_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(11);
    let mapper = unit_mapper(6);
    let nodes: Vec<MappedNode> = (0..200)
        .map(|i| {
            let pos = GridPosition::new(rng.gen_range(0..64), rng.gen_range(0..64));
            MappedNode {
                coord: Coordinate::new(format!("n{i}"), vec![0.0, 0.0], 0.0),
                curve_index: mapper.map_to_index(pos).unwrap(),
                grid_position: pos,
            }
        })
        .collect();
    let index = SpatialIndex::build(nodes.clone());

    for _ in 0..100 {
        let ranges: Vec<IndexRange> = (0..rng.gen_range(1..6))
            .map(|_| {
                let lo = rng.gen_range(0..4096u64);
                IndexRange::new(lo, (lo + rng.gen_range(0..300)).min(4095))
            })
            .collect();
        let got: Vec<&str> = index.multi_range_query(&ranges).iter().map(|n| n.name()).collect();
        let unique: HashSet<&str> = got.iter().copied().collect();
        assert_eq!(unique.len(), got.len(), "duplicates in {ranges:?}");
        let want: HashSet<&str> = nodes
            .iter()
            .filter(|n| ranges.iter().any(|r| r.contains(n.curve_index)))
            .map(|n| n.name())
            .collect();
        assert_eq!(unique, want);
    }
}
