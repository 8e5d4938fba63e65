use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VicinityError>;

#[derive(Debug, Error)]
pub enum VicinityError {
    /// Two coordinates with different vector lengths were compared.
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("curve mapping needs at least 2 vector components, got {0}")]
    UnsupportedDimension(usize),

    #[error("node not found in snapshot: {0}")]
    NodeNotFound(String),

    /// No calibrated threshold is at or below the requested budget.
    #[error("no calibration covers a budget of {budget_ms:.2}ms")]
    UncalibratedBudget { budget_ms: f64 },

    #[error("rtt budget must be positive and finite, got {0}")]
    InvalidBudget(f64),

    #[error("coordinate provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("calibration for {reference} was built on snapshot {table}, current is {snapshot}")]
    StaleCalibration {
        reference: String,
        table: String,
        snapshot: String,
    },

    #[error("snapshot has no coordinates")]
    EmptySnapshot,

    #[error("duplicate node name in snapshot: {0}")]
    DuplicateNode(String),

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contract violations inside the curve mapper. These never occur for
/// positions produced by `CurveMapper::normalize`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("grid order must be in 1..={max}, got {order}")]
    InvalidOrder { order: u32, max: u32 },

    #[error("grid position ({x}, {y}) outside 0..{grid_size}")]
    OutOfGrid { x: u32, y: u32, grid_size: u32 },

    #[error("curve index {index} outside 0..{cells}")]
    IndexOutOfRange { index: u64, cells: u64 },
}
