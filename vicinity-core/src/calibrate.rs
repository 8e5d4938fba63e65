//! Latency threshold to curve-distance calibration.
//!
//! For one reference node, every other node contributes its estimated RTT
//! and its curve-index distance from the reference. For each threshold the
//! distances of the nodes within that RTT are sorted and the value at the
//! configured percentile becomes the cutoff: an index window of that
//! half-width is expected to hold that share of the true neighbours.

use serde::{Deserialize, Serialize};

use crate::coordinate::estimate_rtt;
use crate::error::{Result, VicinityError};
use crate::index::SpatialIndex;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cutoff {
    pub threshold_ms: f64,
    pub cutoff: u64,
    /// Nodes within the threshold that the cutoff was sampled from.
    pub population: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffTable {
    pub reference: String,
    pub percentile: f64,
    pub snapshot_fingerprint: String,
    pub entries: Vec<Cutoff>,
}

impl CutoffTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cutoff recorded for exactly `threshold_ms`. `None` means the
    /// threshold had no nodes under it, not a zero-width window.
    pub fn get(&self, threshold_ms: f64) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.threshold_ms == threshold_ms)
            .map(|e| e.cutoff)
    }

    /// Largest calibrated threshold at or below `budget_ms`.
    pub fn select(&self, budget_ms: f64) -> Option<&Cutoff> {
        self.entries
            .iter()
            .filter(|e| e.threshold_ms <= budget_ms)
            .max_by(|a, b| a.threshold_ms.total_cmp(&b.threshold_ms))
    }

    pub fn ensure_fresh(&self, fingerprint: &str) -> Result<()> {
        if self.snapshot_fingerprint != fingerprint {
            return Err(VicinityError::StaleCalibration {
                reference: self.reference.clone(),
                table: self.snapshot_fingerprint.clone(),
                snapshot: fingerprint.to_string(),
            });
        }
        Ok(())
    }
}

pub fn calibrate(
    index: &SpatialIndex,
    reference: &str,
    thresholds_ms: &[f64],
    percentile: f64,
    fingerprint: &str,
) -> Result<CutoffTable> {
    let origin = index
        .get(reference)
        .ok_or_else(|| VicinityError::NodeNotFound(reference.to_string()))?;

    let mut metrics: Vec<(f64, u64)> = Vec::with_capacity(index.len());
    for node in index.nodes() {
        if node.name() == reference {
            continue;
        }
        let rtt = estimate_rtt(&origin.coord, &node.coord)?;
        metrics.push((rtt, origin.curve_index.abs_diff(node.curve_index)));
    }

    let mut thresholds: Vec<f64> = thresholds_ms
        .iter()
        .copied()
        .filter(|t| t.is_finite())
        .collect();
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();

    let mut entries = Vec::with_capacity(thresholds.len());
    let mut floor = 0u64;
    for threshold_ms in thresholds {
        let mut diffs: Vec<u64> = metrics
            .iter()
            .filter(|(rtt, _)| *rtt <= threshold_ms)
            .map(|(_, diff)| *diff)
            .collect();
        if diffs.is_empty() {
            tracing::debug!(threshold_ms, "no nodes within threshold, bucket left uncalibrated");
            continue;
        }
        diffs.sort_unstable();
        let Some(raw) = quantile(&diffs, percentile) else {
            continue;
        };
        // wider budgets never get narrower windows
        let cutoff = raw.max(floor);
        floor = cutoff;
        tracing::debug!(
            threshold_ms,
            cutoff,
            raw_cutoff = raw,
            nodes = diffs.len(),
            "calibrated bucket"
        );
        entries.push(Cutoff {
            threshold_ms,
            cutoff,
            population: diffs.len(),
        });
    }

    tracing::info!(
        reference,
        buckets = entries.len(),
        population = metrics.len(),
        "calibration complete"
    );

    Ok(CutoffTable {
        reference: reference.to_string(),
        percentile,
        snapshot_fingerprint: fingerprint.to_string(),
        entries,
    })
}

/// Value at rank `round(q * (len - 1))`, clamped to the last element.
pub fn quantile(sorted: &[u64], q: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}
