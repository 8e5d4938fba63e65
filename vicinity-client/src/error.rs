use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vicinity_core::VicinityError;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The node list itself could not be fetched.
    #[error("coordinate provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid fetch configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Core(#[from] VicinityError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<FetchError> for VicinityError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::ProviderUnavailable(msg) => VicinityError::ProviderUnavailable(msg),
            FetchError::InvalidConfig(msg) => VicinityError::InvalidConfig(msg),
            FetchError::Read { source, .. } => VicinityError::Io(source),
            FetchError::Core(err) => err,
            FetchError::Json(err) => VicinityError::Json(err),
        }
    }
}
