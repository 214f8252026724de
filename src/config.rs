//! Engine Configuration
//!
//! Tuning knobs for the orchestrator, loaded from YAML. Every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```yaml
//! max_parallel: 8
//! base_delay_ms: 250
//! backoff_multiplier: 2.0
//! max_delay_ms: 10000
//! default_timeout_seconds: 30
//! audit_log: runs/audit.jsonl
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_max_parallel() -> usize {
    num_cpus::get()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_seconds() -> u64 {
    60
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Concurrent steps per level
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// First retry delay
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single retry delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-attempt timeout for steps that do not set their own
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,

    /// JSON-lines audit file; in-memory only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            default_timeout_seconds: default_timeout_seconds(),
            audit_log: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading engine configuration from: {}", path.display());
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&yaml)?;
        debug!("{:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid("max_parallel must be at least 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("default_timeout_seconds must be at least 1".to_string()));
        }
        Ok(())
    }
}
