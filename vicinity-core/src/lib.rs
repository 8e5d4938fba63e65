//! Proximity queries over Vivaldi network coordinates.
//!
//! A snapshot of coordinates is projected onto a Hilbert curve and sorted
//! by curve index. Per reference node, a calibration pass measures how far
//! along the curve the nodes within each latency threshold sit, so a query
//! for "everything within R ms" becomes one index window scan plus a check
//! of the estimated RTT of each candidate.
//!
//! ```text
//! RTT(A, B) = (||vec_A - vec_B|| + h_A + h_B [+ adj_A + adj_B]) * 1000
//! ```

pub mod calibrate;
pub mod config;
pub mod coordinate;
pub mod curve;
pub mod drift;
pub mod error;
pub mod eval;
pub mod index;
pub mod provider;
pub mod query;
pub mod snapshot;

pub use calibrate::{calibrate, quantile, Cutoff, CutoffTable};
pub use config::EngineConfig;
pub use coordinate::{estimate_rtt, vector_distance, Coordinate};
pub use curve::{BoundingBox, CurveMapper, GridPosition};
pub use drift::{drift, drift_from, DriftRecord};
pub use error::{CurveError, Result, VicinityError};
pub use eval::{
    cross_reference_recall, evaluate, neighbor_overlap, pairwise, CrossRecall, PairRtt,
    RecallReport,
};
pub use index::{merge_ranges, IndexRange, MappedNode, SpatialIndex};
pub use provider::{CoordinateProvider, ProviderError};
pub use query::{Neighbor, QueryEngine, QueryResult, Strategy};
pub use snapshot::{Exclusion, ExclusionReason, Snapshot};
