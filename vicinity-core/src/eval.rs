//! Accuracy measurements of indexed queries against a full scan.

use std::collections::HashSet;

use serde::Serialize;

use crate::calibrate::CutoffTable;
use crate::coordinate::estimate_rtt;
use crate::error::{Result, VicinityError};
use crate::query::QueryEngine;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRtt {
    pub from: String,
    pub to: String,
    pub rtt_ms: f64,
}

/// Estimated RTT for every unordered pair, closest pairs first.
pub fn pairwise(snapshot: &Snapshot) -> Result<Vec<PairRtt>> {
    let coords = snapshot.coordinates();
    let mut out = Vec::with_capacity(coords.len() * coords.len().saturating_sub(1) / 2);
    for (i, a) in coords.iter().enumerate() {
        for b in &coords[i + 1..] {
            out.push(PairRtt {
                from: a.name.clone(),
                to: b.name.clone(),
                rtt_ms: estimate_rtt(a, b)?,
            });
        }
    }
    out.sort_by(|x, y| x.rtt_ms.total_cmp(&y.rtt_ms));
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallReport {
    pub reference: String,
    pub budget_ms: f64,
    pub expected: usize,
    pub found: usize,
    pub true_positives: usize,
    pub false_negatives: usize,
    pub false_positives: usize,
    pub recall: f64,
    /// Share of the population scanned before verification.
    pub candidate_ratio: f64,
}

pub fn evaluate(
    engine: &QueryEngine,
    table: &CutoffTable,
    reference: &str,
    budget_ms: f64,
) -> Result<RecallReport> {
    let indexed = engine.query(table, reference, budget_ms)?;
    let truth = engine.exhaustive(reference, budget_ms)?;

    let want: HashSet<&str> = truth.names().into_iter().collect();
    let got: HashSet<&str> = indexed.names().into_iter().collect();
    let true_positives = got.intersection(&want).count();
    let recall = if want.is_empty() {
        1.0
    } else {
        true_positives as f64 / want.len() as f64
    };
    let population = engine.index().len().max(1);

    Ok(RecallReport {
        reference: reference.to_string(),
        budget_ms,
        expected: want.len(),
        found: got.len(),
        true_positives,
        false_negatives: want.len() - true_positives,
        false_positives: got.len() - true_positives,
        recall,
        candidate_ratio: indexed.candidates as f64 / population as f64,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossRecall {
    pub calibrated_for: String,
    pub budget_ms: f64,
    pub queries: usize,
    pub mean_recall: f64,
    pub min_recall: f64,
}

/// Recall of `table` when reused for queries issued from other nodes.
pub fn cross_reference_recall(
    engine: &QueryEngine,
    table: &CutoffTable,
    references: &[String],
    budget_ms: f64,
) -> Result<CrossRecall> {
    if references.is_empty() {
        return Err(VicinityError::InvalidConfig(
            "cross-reference recall needs at least one reference".into(),
        ));
    }
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    for reference in references {
        let report = evaluate(engine, table, reference, budget_ms)?;
        sum += report.recall;
        min = min.min(report.recall);
    }
    Ok(CrossRecall {
        calibrated_for: table.reference.clone(),
        budget_ms,
        queries: references.len(),
        mean_recall: sum / references.len() as f64,
        min_recall: min,
    })
}

/// Share of the `k` nearest nodes by RTT that are also among the `k`
/// nearest by curve distance.
pub fn neighbor_overlap(engine: &QueryEngine, reference: &str, k: usize) -> Result<f64> {
    let by_rtt = engine.nearest_by_rtt(reference, k)?;
    if by_rtt.is_empty() {
        return Ok(1.0);
    }
    let by_index = engine.nearest_by_index(reference, k)?;
    let index_names: HashSet<&str> = by_index.iter().map(|n| n.name.as_str()).collect();
    let shared = by_rtt
        .iter()
        .filter(|n| index_names.contains(n.name.as_str()))
        .count();
    Ok(shared as f64 / by_rtt.len() as f64)
}
