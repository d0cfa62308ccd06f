use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for graph construction and interaction analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Certify costs through covering nodes instead of calling the oracle
    pub use_covering_nodes: bool,
    /// Run the monotonicity repair pass on every completed graph
    pub enforce_monotonicity: bool,
    /// Analyze while constructing; otherwise analyze after construction
    pub concurrent_analysis: bool,
    /// Granularity of blocking waits in milliseconds
    pub wait_timeout_ms: u64,
    /// Default threshold for the stable partition
    pub interaction_threshold: f64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            use_covering_nodes: true,
            enforce_monotonicity: true,
            concurrent_analysis: true,
            wait_timeout_ms: 50,
            interaction_threshold: 0.01,
        }
    }
}

impl AdvisorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AdvisorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(Error::Config("wait_timeout_ms must be positive".to_string()));
        }
        if !self.interaction_threshold.is_finite() || self.interaction_threshold < 0.0 {
            return Err(Error::Config(format!(
                "interaction_threshold must be a non-negative number, got {}",
                self.interaction_threshold
            )));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Ready-made configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorPreset {
    Default,
    /// Construction fully completes before analysis starts
    Sequential,
    /// Every node costs one oracle call (no covering-node reuse)
    Exhaustive,
}

impl AdvisorPreset {
    pub fn to_config(self) -> AdvisorConfig {
        match self {
            AdvisorPreset::Default => AdvisorConfig::default(),
            AdvisorPreset::Sequential => AdvisorConfig {
                concurrent_analysis: false,
                ..AdvisorConfig::default()
            },
            AdvisorPreset::Exhaustive => AdvisorConfig {
                use_covering_nodes: false,
                concurrent_analysis: false,
                ..AdvisorConfig::default()
            },
        }
    }
}
