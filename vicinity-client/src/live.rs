use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use vicinity_core::{
    CoordinateProvider, CutoffTable, EngineConfig, QueryEngine, QueryResult, Snapshot,
};

use crate::config::FetchConfig;
use crate::error::Result;
use crate::fetch::fetch_snapshot;

/// One consistent generation: snapshot, index and the calibration made
/// from them.
#[derive(Debug)]
pub struct Built {
    pub generation: u64,
    pub engine: QueryEngine,
    pub table: CutoffTable,
}

impl Built {
    pub fn query(&self, reference: &str, budget_ms: f64) -> Result<QueryResult> {
        Ok(self.engine.query(&self.table, reference, budget_ms)?)
    }
}

/// Current generation behind an atomic pointer. Readers never see a
/// half-built index; a failed rebuild leaves the previous one in place.
pub struct LiveView {
    config: EngineConfig,
    reference: String,
    generation: AtomicU64,
    current: ArcSwap<Built>,
}

impl LiveView {
    pub fn new(
        snapshot: Snapshot,
        config: EngineConfig,
        reference: impl Into<String>,
    ) -> Result<Self> {
        let reference = reference.into();
        let built = build(snapshot, &config, &reference, 0)?;
        Ok(Self {
            config,
            reference,
            generation: AtomicU64::new(0),
            current: ArcSwap::from_pointee(built),
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn load(&self) -> Arc<Built> {
        self.current.load_full()
    }

    /// Builds a new generation and swaps it in. When a concurrent refresh
    /// that started later has already landed, the newer view is kept and
    /// returned instead.
    pub fn refresh(&self, snapshot: Snapshot) -> Result<Arc<Built>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let built = Arc::new(build(snapshot, &self.config, &self.reference, generation)?);
        Ok(self.install(built))
    }

    pub fn refresh_from<P>(&self, provider: Arc<P>, fetch: &FetchConfig) -> Result<Arc<Built>>
    where
        P: CoordinateProvider + ?Sized + 'static,
    {
        let snapshot = fetch_snapshot(provider, fetch)?;
        self.refresh(snapshot)
    }

    fn install(&self, built: Arc<Built>) -> Arc<Built> {
        let previous = self.current.rcu(|cur| {
            if cur.generation < built.generation {
                Arc::clone(&built)
            } else {
                Arc::clone(cur)
            }
        });
        if previous.generation >= built.generation {
            tracing::debug!(
                generation = built.generation,
                current = previous.generation,
                "discarding superseded generation"
            );
            return previous;
        }
        tracing::info!(
            generation = built.generation,
            nodes = built.engine.index().len(),
            fingerprint = %built.engine.snapshot().fingerprint(),
            "live view swapped"
        );
        built
    }
}

fn build(
    snapshot: Snapshot,
    config: &EngineConfig,
    reference: &str,
    generation: u64,
) -> Result<Built> {
    let engine = QueryEngine::build(Arc::new(snapshot), config)?;
    let table = engine.calibrate(reference)?;
    Ok(Built {
        generation,
        engine,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicinity_core::{Coordinate, VicinityError};

    const TEST_REFERENCE: &str = "a";

    fn config() -> EngineConfig {
        EngineConfig {
            grid_order: 4,
            thresholds_ms: vec![1000.0, 5000.0],
            ..Default::default()
        }
    }

    fn snapshot(b_x: f64) -> Snapshot {
        Snapshot::new(vec![
            Coordinate::new("a", vec![0.0, 0.0], 0.0),
            Coordinate::new("b", vec![b_x, 0.0], 0.0),
            Coordinate::new("c", vec![4.0, 4.0], 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn refresh_swaps_whole_generations() {
        let view = LiveView::new(snapshot(0.5), config(), TEST_REFERENCE).unwrap();
        let before = view.load();
        assert_eq!(before.generation, 0);
        let res = before.query("a", 5000.0).unwrap();
        assert_eq!(res.names(), vec!["b"]);
        assert!((res.neighbors[0].rtt_ms - 500.0).abs() < 1e-9);

        view.refresh(snapshot(3.0)).unwrap();
        let after = view.load();
        assert_eq!(after.generation, 1);
        let res = after.query("a", 5000.0).unwrap();
        assert_eq!(res.names(), vec!["b"]);
        assert!((res.neighbors[0].rtt_ms - 3000.0).abs() < 1e-9);
        assert_ne!(
            before.engine.snapshot().fingerprint(),
            after.engine.snapshot().fingerprint()
        );
        // b moved out of the 1000ms bucket
        assert_eq!(after.table.get(1000.0), None);
        // readers holding the old generation keep a consistent view
        assert_eq!(before.query("a", 1000.0).unwrap().names(), vec!["b"]);
    }

    #[test]
    fn older_generation_never_replaces_newer() {
        let view = LiveView::new(snapshot(0.5), config(), TEST_REFERENCE).unwrap();
        let older = Arc::new(build(snapshot(1.0), &config(), TEST_REFERENCE, 1).unwrap());
        let newer = Arc::new(build(snapshot(3.0), &config(), TEST_REFERENCE, 2).unwrap());

        assert_eq!(view.install(Arc::clone(&newer)).generation, 2);
        let kept = view.install(older);
        assert_eq!(kept.generation, 2);
        assert_eq!(view.load().generation, 2);
        assert_eq!(
            view.load().engine.snapshot().fingerprint(),
            newer.engine.snapshot().fingerprint()
        );
    }

    #[test]
    fn failed_refresh_keeps_previous_view() {
        let view = LiveView::new(snapshot(0.5), config(), TEST_REFERENCE).unwrap();
        let without_reference = Snapshot::new(vec![
            Coordinate::new("x", vec![0.0, 0.0], 0.0),
            Coordinate::new("y", vec![1.0, 0.0], 0.0),
        ])
        .unwrap();
        let err = view.refresh(without_reference).unwrap_err();
        assert!(matches!(
            err,
            crate::error::FetchError::Core(VicinityError::NodeNotFound(_))
        ));
        assert_eq!(view.load().generation, 0);
    }
}
