//! Configuration management for Pacer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration for a throttle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Minimum interval between action runs, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    crate::throttle::DEFAULT_INTERVAL.as_millis() as u64
}

impl PacerConfig {
    /// The configured interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PacerConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::PacerError::Config(e.to_string()))?;
        Ok(config)
    }
}
