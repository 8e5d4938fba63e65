use serde::{Deserialize, Serialize};

use crate::error::{Result, VicinityError};

pub const MS_PER_SEC: f64 = 1000.0;

/// Height floor used by Vivaldi implementations, in seconds (10us).
pub const MIN_HEIGHT: f64 = 1.0e-5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub name: String,
    pub vector: Vec<f64>,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub adjustment: f64,
    #[serde(default)]
    pub error: f64,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, vector: Vec<f64>, height: f64) -> Self {
        Self {
            name: name.into(),
            vector,
            height,
            adjustment: 0.0,
            error: 0.0,
        }
    }

    pub fn with_adjustment(mut self, adjustment: f64) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn with_error(mut self, error: f64) -> Self {
        self.error = error;
        self
    }

    /// The fixed reference point drift is measured against: zero vector,
    /// minimum height, no adjustment.
    pub fn origin(dim: usize) -> Self {
        Self {
            name: "origin".to_string(),
            vector: vec![0.0; dim],
            height: MIN_HEIGHT,
            adjustment: 0.0,
            error: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn is_finite(&self) -> bool {
        self.vector.iter().all(|v| v.is_finite())
            && self.height.is_finite()
            && self.adjustment.is_finite()
    }

    pub fn rtt_ms(&self, other: &Coordinate) -> Result<f64> {
        estimate_rtt(self, other)
    }
}

/// Euclidean distance between the two vectors, in native (seconds) units.
pub fn vector_distance(a: &Coordinate, b: &Coordinate) -> Result<f64> {
    if a.vector.len() != b.vector.len() {
        return Err(VicinityError::DimensionMismatch {
            left: a.vector.len(),
            right: b.vector.len(),
        });
    }
    let sumsq: f64 = a
        .vector
        .iter()
        .zip(&b.vector)
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sumsq.sqrt())
}

/// Estimated round trip time between two coordinates in milliseconds.
///
/// Distance plus both heights is the base estimate. Both adjustments are
/// added on top, but only while the result stays positive; otherwise the
/// base estimate is used.
pub fn estimate_rtt(a: &Coordinate, b: &Coordinate) -> Result<f64> {
    let base = vector_distance(a, b)? + a.height + b.height;
    let adjusted = base + a.adjustment + b.adjustment;
    let rtt = if adjusted > 0.0 { adjusted } else { base };
    Ok(rtt * MS_PER_SEC)
}
