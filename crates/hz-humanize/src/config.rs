//! Humanization configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HumanizeError, HumanizeResult};
use crate::window::VelocityWindow;

/// Database key used for candidate lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// (note, message type, quarter position)
    Positioned,
    /// (note, message type), all positions pooled
    Coarse,
}

impl Default for Granularity {
    fn default() -> Self {
        Self::Positioned
    }
}

/// Humanize configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizeConfig {
    /// Sampled velocities must fall strictly inside this window
    pub window: VelocityWindow,

    pub granularity: Granularity,

    /// Fixed seed for reproducible output (None = OS entropy)
    pub seed: Option<u64>,
}

impl HumanizeConfig {
    pub fn with_window(mut self, window: VelocityWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> HumanizeResult<()> {
        self.window.validate()
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> HumanizeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HumanizeConfig = serde_json::from_str(&content)
            .map_err(|e| HumanizeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
