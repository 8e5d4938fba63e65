use thiserror::Error;

use crate::coordinate::Coordinate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of coordinates for the nodes of a cluster.
///
/// `get_coordinate` returns `Ok(None)` when the node is known but has no
/// coordinate yet. Implementations are shared across fetch workers.
pub trait CoordinateProvider: Send + Sync {
    fn list_nodes(&self) -> Result<Vec<String>, ProviderError>;

    fn get_coordinate(&self, name: &str) -> Result<Option<Coordinate>, ProviderError>;
}

impl<P: CoordinateProvider + ?Sized> CoordinateProvider for std::sync::Arc<P> {
    fn list_nodes(&self) -> Result<Vec<String>, ProviderError> {
        (**self).list_nodes()
    }

    fn get_coordinate(&self, name: &str) -> Result<Option<Coordinate>, ProviderError> {
        (**self).get_coordinate(name)
    }
}
