//! Configuration types for corpus scanning

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, CorpusResult};

/// Upper bound on `max_concurrent_files`; each slot is one decoder thread.
pub const MAX_CONCURRENT_FILES: usize = 256;

/// Key layout of a persisted velocity database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseLayout {
    /// note → message type → quarter position → velocities
    Positioned,
    /// note → message type → velocities
    Coarse,
}

impl Default for DatabaseLayout {
    fn default() -> Self {
        Self::Positioned
    }
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Files decoded in parallel (admission gate capacity)
    pub max_concurrent_files: usize,

    /// Stop draining after this many decoded files (None = whole corpus)
    pub result_limit: Option<usize>,

    /// Layout written by `scan`
    pub layout: DatabaseLayout,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 2,
            result_limit: None,
            layout: DatabaseLayout::Positioned,
        }
    }
}

impl ScanConfig {
    /// One worker per available core
    pub fn fast() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            max_concurrent_files: cores.clamp(2, 10),
            ..Default::default()
        }
    }

    /// Set parallel file count
    pub fn with_concurrency(mut self, count: usize) -> Self {
        self.max_concurrent_files = count;
        self
    }

    /// Set result cap
    pub fn with_result_limit(mut self, limit: Option<usize>) -> Self {
        self.result_limit = limit;
        self
    }

    /// Set persisted layout
    pub fn with_layout(mut self, layout: DatabaseLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn validate(&self) -> CorpusResult<()> {
        if self.max_concurrent_files == 0 {
            return Err(CorpusError::InvalidConfig(
                "max_concurrent_files must be > 0".to_string(),
            ));
        }
        if self.max_concurrent_files > MAX_CONCURRENT_FILES {
            return Err(CorpusError::InvalidConfig(format!(
                "max_concurrent_files must be <= {}, got {}",
                MAX_CONCURRENT_FILES, self.max_concurrent_files
            )));
        }
        if self.result_limit == Some(0) {
            return Err(CorpusError::InvalidConfig(
                "result_limit must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> CorpusResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
