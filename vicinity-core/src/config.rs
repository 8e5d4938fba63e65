use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::curve::MAX_ORDER;
use crate::error::{Result, VicinityError};

pub const DEFAULT_GRID_ORDER: u32 = 10;
pub const DEFAULT_PERCENTILE: f64 = 0.95;
pub const DEFAULT_PADDING: f64 = 0.05;
pub const MAX_PADDING: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_grid_order")]
    pub grid_order: u32,
    #[serde(default = "default_thresholds_ms")]
    pub thresholds_ms: Vec<f64>,
    #[serde(default = "default_percentile")]
    pub percentile: f64,
    #[serde(default = "default_padding")]
    pub padding: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_order: default_grid_order(),
            thresholds_ms: default_thresholds_ms(),
            percentile: default_percentile(),
            padding: default_padding(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        let cfg: Self = serde_json::from_slice(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_order == 0 || self.grid_order > MAX_ORDER {
            return Err(VicinityError::InvalidConfig(format!(
                "gridOrder must be in 1..={MAX_ORDER}"
            )));
        }
        if self.thresholds_ms.is_empty() {
            return Err(VicinityError::InvalidConfig(
                "thresholdsMs must not be empty".into(),
            ));
        }
        if self
            .thresholds_ms
            .iter()
            .any(|t| !t.is_finite() || *t <= 0.0)
        {
            return Err(VicinityError::InvalidConfig(
                "thresholdsMs must be positive and finite".into(),
            ));
        }
        if self.thresholds_ms.windows(2).any(|w| w[0] >= w[1]) {
            return Err(VicinityError::InvalidConfig(
                "thresholdsMs must be strictly ascending".into(),
            ));
        }
        if !(self.percentile > 0.0 && self.percentile <= 1.0) {
            return Err(VicinityError::InvalidConfig(
                "percentile must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=MAX_PADDING).contains(&self.padding) {
            return Err(VicinityError::InvalidConfig(format!(
                "padding must be in [0, {MAX_PADDING}]"
            )));
        }
        Ok(())
    }
}

fn default_grid_order() -> u32 {
    DEFAULT_GRID_ORDER
}

fn default_thresholds_ms() -> Vec<f64> {
    (1..=17).map(|i| f64::from(i) * 5.0).collect()
}

fn default_percentile() -> f64 {
    DEFAULT_PERCENTILE
}

fn default_padding() -> f64 {
    DEFAULT_PADDING
}
