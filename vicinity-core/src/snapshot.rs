use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::coordinate::Coordinate;
use crate::error::{Result, VicinityError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ExclusionReason {
    NotFound,
    Provider { message: String },
    Timeout { elapsed_ms: u64 },
    DeadlineExceeded,
    DimensionMismatch { expected: usize, got: usize },
    NonFinite,
    Duplicate,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NotFound => write!(f, "not found"),
            ExclusionReason::Provider { message } => write!(f, "provider error: {message}"),
            ExclusionReason::Timeout { elapsed_ms } => write!(f, "timed out after {elapsed_ms}ms"),
            ExclusionReason::DeadlineExceeded => write!(f, "fetch deadline exceeded"),
            ExclusionReason::DimensionMismatch { expected, got } => {
                write!(f, "dimension {got}, snapshot uses {expected}")
            }
            ExclusionReason::NonFinite => write!(f, "non-finite coordinate"),
            ExclusionReason::Duplicate => write!(f, "duplicate name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclusion {
    pub name: String,
    pub reason: ExclusionReason,
}

/// An immutable, name-ordered set of coordinates sharing one dimensionality.
#[derive(Debug, Clone)]
pub struct Snapshot {
    coords: Vec<Coordinate>,
    by_name: HashMap<String, usize>,
    dim: usize,
    fingerprint: String,
    excluded: Vec<Exclusion>,
}

impl Snapshot {
    /// Strict constructor: every coordinate must share one dimensionality
    /// and names must be unique.
    pub fn new(coords: Vec<Coordinate>) -> Result<Self> {
        Self::with_exclusions(coords, Vec::new())
    }

    pub fn with_exclusions(mut coords: Vec<Coordinate>, excluded: Vec<Exclusion>) -> Result<Self> {
        let first = coords.first().ok_or(VicinityError::EmptySnapshot)?;
        let dim = first.dim();
        for c in &coords {
            if c.dim() != dim {
                return Err(VicinityError::DimensionMismatch {
                    left: dim,
                    right: c.dim(),
                });
            }
        }
        coords.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = coords.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(VicinityError::DuplicateNode(pair[0].name.clone()));
        }
        let by_name = coords
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        let fingerprint = fingerprint(&coords);
        Ok(Self {
            coords,
            by_name,
            dim,
            fingerprint,
            excluded,
        })
    }

    /// Lenient constructor for fetched data. Keeps the most common
    /// dimensionality (the smaller one on a tie) and excludes coordinates
    /// that differ, are non-finite or repeat a name, recording why.
    pub fn assemble(coords: Vec<Coordinate>, mut excluded: Vec<Exclusion>) -> Result<Self> {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for c in coords.iter().filter(|c| c.is_finite()) {
            *counts.entry(c.dim()).or_insert(0) += 1;
        }
        let dim = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(d, _)| *d);

        let mut kept: BTreeMap<String, Coordinate> = BTreeMap::new();
        for c in coords {
            let reason = if !c.is_finite() {
                Some(ExclusionReason::NonFinite)
            } else if Some(c.dim()) != dim {
                Some(ExclusionReason::DimensionMismatch {
                    expected: dim.unwrap_or(0),
                    got: c.dim(),
                })
            } else if kept.contains_key(&c.name) {
                Some(ExclusionReason::Duplicate)
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    tracing::warn!(node = %c.name, %reason, "excluding node from snapshot");
                    excluded.push(Exclusion { name: c.name, reason });
                }
                None => {
                    kept.insert(c.name.clone(), c);
                }
            }
        }
        excluded.sort_by(|a, b| a.name.cmp(&b.name));
        Self::with_exclusions(kept.into_values().collect(), excluded)
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn get(&self, name: &str) -> Option<&Coordinate> {
        self.by_name.get(name).map(|&i| &self.coords[i])
    }

    pub fn require(&self, name: &str) -> Result<&Coordinate> {
        self.get(name)
            .ok_or_else(|| VicinityError::NodeNotFound(name.to_string()))
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

fn fingerprint(coords: &[Coordinate]) -> String {
    let mut hasher = Sha256::new();
    for c in coords {
        hasher.update(c.name.as_bytes());
        hasher.update([0u8]);
        hasher.update((c.vector.len() as u64).to_be_bytes());
        for v in &c.vector {
            hasher.update(v.to_bits().to_be_bytes());
        }
        hasher.update(c.height.to_bits().to_be_bytes());
        hasher.update(c.adjustment.to_bits().to_be_bytes());
    }
    bytes_to_hex(&hasher.finalize())
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
