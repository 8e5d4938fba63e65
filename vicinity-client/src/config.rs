use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_PER_NODE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_DEADLINE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_per_node_timeout_ms")]
    pub per_node_timeout_ms: u64,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_per_node_timeout_ms() -> u64 {
    DEFAULT_PER_NODE_TIMEOUT_MS
}

fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE_MS
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            per_node_timeout_ms: DEFAULT_PER_NODE_TIMEOUT_MS,
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }
}

impl FetchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| FetchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: FetchConfig = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FetchError::InvalidConfig("workers must be > 0".into()));
        }
        if self.per_node_timeout_ms == 0 || self.deadline_ms == 0 {
            return Err(FetchError::InvalidConfig(
                "perNodeTimeoutMs and deadlineMs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn per_node_timeout(&self) -> Duration {
        Duration::from_millis(self.per_node_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}
