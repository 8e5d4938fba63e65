//! Coordinate acquisition for the vicinity query engine: provider
//! implementations, a bounded parallel snapshot fetch and an atomically
//! swapped live view.

pub mod config;
pub mod error;
pub mod fetch;
pub mod live;
pub mod provider;

pub use config::FetchConfig;
pub use error::{FetchError, Result};
pub use fetch::fetch_snapshot;
pub use live::{Built, LiveView};
pub use provider::{JsonlProvider, StaticProvider};
