use serde::Serialize;

use crate::coordinate::{estimate_rtt, vector_distance, Coordinate, MS_PER_SEC};
use crate::error::Result;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftRecord {
    pub name: String,
    pub vec_distance_ms: f64,
    pub total_drift_ms: f64,
    pub height: f64,
    pub adjustment: f64,
}

/// How far each coordinate sits from `origin`: the bare vector distance
/// and the full RTT estimate, both in milliseconds.
pub fn drift_from(snapshot: &Snapshot, origin: &Coordinate) -> Result<Vec<DriftRecord>> {
    snapshot
        .coordinates()
        .iter()
        .map(|c| {
            Ok(DriftRecord {
                name: c.name.clone(),
                vec_distance_ms: vector_distance(c, origin)? * MS_PER_SEC,
                total_drift_ms: estimate_rtt(c, origin)?,
                height: c.height,
                adjustment: c.adjustment,
            })
        })
        .collect()
}

pub fn drift(snapshot: &Snapshot) -> Result<Vec<DriftRecord>> {
    drift_from(snapshot, &Coordinate::origin(snapshot.dim()))
}
