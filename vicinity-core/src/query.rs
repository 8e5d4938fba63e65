use std::sync::Arc;

use serde::Serialize;

use crate::calibrate::{calibrate, CutoffTable};
use crate::config::EngineConfig;
use crate::coordinate::{estimate_rtt, MS_PER_SEC};
use crate::curve::{BoundingBox, CurveMapper};
use crate::error::{Result, VicinityError};
use crate::index::{IndexRange, MappedNode, SpatialIndex};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub name: String,
    pub rtt_ms: f64,
    pub curve_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Strategy {
    /// Index window from a calibrated cutoff. Up to `1 - expected_recall`
    /// of the true neighbours may fall outside the window.
    Calibrated {
        threshold_ms: f64,
        cutoff: u64,
        expected_recall: f64,
        calibrated_for: String,
    },
    /// Curve ranges covering the square around the reference.
    BoundingBox { radius: f64 },
    Exhaustive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub reference: String,
    pub budget_ms: f64,
    pub strategy: Strategy,
    pub ranges: Vec<IndexRange>,
    /// Nodes scanned before verification, reference included.
    pub candidates: usize,
    pub neighbors: Vec<Neighbor>,
}

impl QueryResult {
    pub fn names(&self) -> Vec<&str> {
        self.neighbors.iter().map(|n| n.name.as_str()).collect()
    }

    /// Neighbours ordered by estimated RTT, closest first.
    pub fn sorted_by_rtt(&self) -> Vec<Neighbor> {
        let mut out = self.neighbors.clone();
        out.sort_by(|a, b| a.rtt_ms.total_cmp(&b.rtt_ms).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

/// Curve mapping and sorted index built from one snapshot. Read-only once
/// built; a new snapshot means a new engine.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    snapshot: Arc<Snapshot>,
    config: EngineConfig,
    mapper: CurveMapper,
    index: SpatialIndex,
}

impl QueryEngine {
    pub fn build(snapshot: Arc<Snapshot>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let bounds = BoundingBox::from_coordinates(snapshot.coordinates(), config.padding)?;
        let mapper = CurveMapper::new(bounds, config.grid_order)?;
        let index = SpatialIndex::from_coordinates(snapshot.coordinates(), &mapper)?;
        tracing::info!(
            nodes = index.len(),
            excluded = snapshot.excluded_count(),
            grid_size = mapper.grid_size(),
            collisions = index.duplicate_indices().len(),
            "spatial index built"
        );
        Ok(Self {
            snapshot,
            config: config.clone(),
            mapper,
            index,
        })
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mapper(&self) -> &CurveMapper {
        &self.mapper
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn calibrate(&self, reference: &str) -> Result<CutoffTable> {
        calibrate(
            &self.index,
            reference,
            &self.config.thresholds_ms,
            self.config.percentile,
            self.snapshot.fingerprint(),
        )
    }

    /// Nodes within `budget_ms` of `reference`, found by scanning the index
    /// window of the tightest calibrated threshold at or below the budget
    /// and keeping only candidates whose estimated RTT fits the budget.
    pub fn query(
        &self,
        table: &CutoffTable,
        reference: &str,
        budget_ms: f64,
    ) -> Result<QueryResult> {
        check_budget(budget_ms)?;
        table.ensure_fresh(self.snapshot.fingerprint())?;
        let origin = self.node(reference)?;
        let entry = table
            .select(budget_ms)
            .ok_or(VicinityError::UncalibratedBudget { budget_ms })?;
        if table.reference != reference {
            tracing::debug!(
                reference,
                calibrated_for = %table.reference,
                "using a cutoff table calibrated for another node"
            );
        }

        let window = IndexRange::around(origin.curve_index, entry.cutoff, self.mapper.max_index());
        let candidates = self.index.range_query(window.lo, window.hi);
        let neighbors = verify(origin, candidates.iter(), budget_ms)?;
        tracing::debug!(
            reference,
            budget_ms,
            threshold_ms = entry.threshold_ms,
            cutoff = entry.cutoff,
            candidates = candidates.len(),
            found = neighbors.len(),
            "calibrated query"
        );
        Ok(QueryResult {
            reference: reference.to_string(),
            budget_ms,
            strategy: Strategy::Calibrated {
                threshold_ms: entry.threshold_ms,
                cutoff: entry.cutoff,
                expected_recall: table.percentile,
                calibrated_for: table.reference.clone(),
            },
            ranges: vec![window],
            candidates: candidates.len(),
            neighbors,
        })
    }

    /// Uncalibrated query over the curve ranges covering the square of
    /// half-width `budget_ms / 1000` around the reference. Exact when no
    /// adjustment is negative.
    pub fn query_box(&self, reference: &str, budget_ms: f64) -> Result<QueryResult> {
        check_budget(budget_ms)?;
        let origin = self.node(reference)?;
        let radius = budget_ms / MS_PER_SEC;
        let (x, y) = (origin.coord.vector[0], origin.coord.vector[1]);
        let (lo, hi) = self.mapper.cell_rect(x, y, radius);
        let ranges = self.mapper.rect_ranges(lo, hi)?;
        let candidates = self.index.multi_range_query(&ranges);
        let neighbors = verify(origin, candidates.iter().copied(), budget_ms)?;
        tracing::debug!(
            reference,
            budget_ms,
            ranges = ranges.len(),
            candidates = candidates.len(),
            found = neighbors.len(),
            "bounding box query"
        );
        Ok(QueryResult {
            reference: reference.to_string(),
            budget_ms,
            strategy: Strategy::BoundingBox { radius },
            ranges,
            candidates: candidates.len(),
            neighbors,
        })
    }

    /// Brute-force scan of the whole snapshot; the ground truth the indexed
    /// queries are measured against.
    pub fn exhaustive(&self, reference: &str, budget_ms: f64) -> Result<QueryResult> {
        check_budget(budget_ms)?;
        let origin = self.node(reference)?;
        let neighbors = verify(origin, self.index.nodes().iter(), budget_ms)?;
        Ok(QueryResult {
            reference: reference.to_string(),
            budget_ms,
            strategy: Strategy::Exhaustive,
            ranges: vec![IndexRange::new(0, self.mapper.max_index())],
            candidates: self.index.len(),
            neighbors,
        })
    }

    pub fn nearest_by_rtt(&self, reference: &str, k: usize) -> Result<Vec<Neighbor>> {
        let origin = self.node(reference)?;
        let mut all = self.others(origin)?;
        all.sort_by(|a, b| a.rtt_ms.total_cmp(&b.rtt_ms).then_with(|| a.name.cmp(&b.name)));
        all.truncate(k);
        Ok(all)
    }

    pub fn nearest_by_index(&self, reference: &str, k: usize) -> Result<Vec<Neighbor>> {
        let origin = self.node(reference)?;
        let mut all = self.others(origin)?;
        all.sort_by(|a, b| {
            let da = a.curve_index.abs_diff(origin.curve_index);
            let db = b.curve_index.abs_diff(origin.curve_index);
            da.cmp(&db).then_with(|| a.name.cmp(&b.name))
        });
        all.truncate(k);
        Ok(all)
    }

    fn node(&self, name: &str) -> Result<&MappedNode> {
        self.index
            .get(name)
            .ok_or_else(|| VicinityError::NodeNotFound(name.to_string()))
    }

    fn others(&self, origin: &MappedNode) -> Result<Vec<Neighbor>> {
        self.index
            .nodes()
            .iter()
            .filter(|n| n.name() != origin.name())
            .map(|n| {
                Ok(Neighbor {
                    name: n.coord.name.clone(),
                    rtt_ms: estimate_rtt(&origin.coord, &n.coord)?,
                    curve_index: n.curve_index,
                })
            })
            .collect()
    }
}

fn check_budget(budget_ms: f64) -> Result<()> {
    if !budget_ms.is_finite() || budget_ms <= 0.0 {
        return Err(VicinityError::InvalidBudget(budget_ms));
    }
    Ok(())
}

// Candidates come from curve ranges, which over-approximate the RTT ball;
// only the estimator decides membership.
fn verify<'a, I>(origin: &MappedNode, candidates: I, budget_ms: f64) -> Result<Vec<Neighbor>>
where
    I: IntoIterator<Item = &'a MappedNode>,
{
    let mut out = Vec::new();
    for node in candidates {
        if node.name() == origin.name() {
            continue;
        }
        let rtt_ms = estimate_rtt(&origin.coord, &node.coord)?;
        if rtt_ms <= budget_ms {
            out.push(Neighbor {
                name: node.coord.name.clone(),
                rtt_ms,
                curve_index: node.curve_index,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;

    const TEST_ORDER: u32 = 6;

    fn grid_snapshot() -> Arc<Snapshot> {
        let mut coords = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                coords.push(Coordinate::new(
                    format!("n{i}_{j}"),
                    vec![f64::from(i) * 0.01, f64::from(j) * 0.01],
                    0.0,
                ));
            }
        }
        Arc::new(Snapshot::new(coords).unwrap())
    }

    fn engine() -> QueryEngine {
        let cfg = EngineConfig {
            grid_order: TEST_ORDER,
            thresholds_ms: vec![15.0, 25.0, 45.0, 85.0],
            ..Default::default()
        };
        QueryEngine::build(grid_snapshot(), &cfg).unwrap()
    }

    #[test]
    fn results_never_exceed_budget() {
        let e = engine();
        let table = e.calibrate("n4_4").unwrap();
        for budget in [15.0, 20.0, 30.0, 50.0, 100.0] {
            let res = e.query(&table, "n4_4", budget).unwrap();
            assert!(res.neighbors.iter().all(|n| n.rtt_ms <= budget));
            assert!(!res.names().contains(&"n4_4"));
            let truth = e.exhaustive("n4_4", budget).unwrap();
            for n in &res.neighbors {
                assert!(truth.names().contains(&n.name.as_str()));
            }
        }
    }

    #[test]
    fn budget_below_first_threshold_is_uncalibrated() {
        let e = engine();
        let table = e.calibrate("n0_0").unwrap();
        match e.query(&table, "n0_0", 5.0) {
            Err(VicinityError::UncalibratedBudget { budget_ms }) => assert_eq!(budget_ms, 5.0),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_budgets_and_unknown_nodes_fail() {
        let e = engine();
        let table = e.calibrate("n0_0").unwrap();
        assert!(matches!(
            e.query(&table, "n0_0", 0.0),
            Err(VicinityError::InvalidBudget(_))
        ));
        assert!(matches!(
            e.query(&table, "n0_0", f64::NAN),
            Err(VicinityError::InvalidBudget(_))
        ));
        assert!(matches!(
            e.query(&table, "missing", 20.0),
            Err(VicinityError::NodeNotFound(_))
        ));
    }

    #[test]
    fn stale_table_is_rejected() {
        let e = engine();
        let mut table = e.calibrate("n0_0").unwrap();
        table.snapshot_fingerprint = "0".repeat(64);
        assert!(matches!(
            e.query(&table, "n0_0", 20.0),
            Err(VicinityError::StaleCalibration { .. })
        ));
    }

    #[test]
    fn box_query_matches_exhaustive() {
        let e = engine();
        for reference in ["n0_0", "n4_4", "n9_2"] {
            for budget in [5.0, 12.0, 30.0, 75.0] {
                let got_res = e.query_box(reference, budget).unwrap();
                let want_res = e.exhaustive(reference, budget).unwrap();
                let mut got = got_res.names();
                let mut want = want_res.names();
                got.sort_unstable();
                want.sort_unstable();
                assert_eq!(got, want, "{reference} @ {budget}ms");
            }
        }
    }

    #[test]
    fn box_query_scans_fewer_nodes_than_exhaustive() {
        let e = engine();
        let res = e.query_box("n4_4", 12.0).unwrap();
        assert!(res.candidates < e.index().len());
        assert!(!res.ranges.is_empty());
    }

    #[test]
    fn nearest_lists_exclude_reference() {
        let e = engine();
        let by_rtt = e.nearest_by_rtt("n4_4", 4).unwrap();
        assert_eq!(by_rtt.len(), 4);
        assert!(by_rtt.iter().all(|n| (n.rtt_ms - 10.0).abs() < 1e-9));
        let by_index = e.nearest_by_index("n4_4", 4).unwrap();
        assert_eq!(by_index.len(), 4);
        assert!(by_index.iter().all(|n| n.name != "n4_4"));
        let origin = e.index().get("n4_4").unwrap().curve_index;
        let diffs: Vec<u64> = by_index.iter().map(|n| n.curve_index.abs_diff(origin)).collect();
        assert!(diffs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sorted_by_rtt_orders_results() {
        let e = engine();
        let res = e.exhaustive("n0_0", 30.0).unwrap();
        let sorted = res.sorted_by_rtt();
        assert!(sorted.windows(2).all(|w| w[0].rtt_ms <= w[1].rtt_ms));
        assert_eq!(sorted.len(), res.neighbors.len());
    }
}
