//! Runtime Configuration
//!
//! Limits and failure policy for one reactive runtime.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// Missing fields fall back to their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How deeply signal writes may nest (a `subscribe` listener writing a
    /// signal whose listener writes again, and so on).
    pub max_write_depth: usize,

    /// How many times a single effect may run inside one flush before it is
    /// treated as an infinite loop.
    pub max_effect_runs: usize,

    /// Run every dependent in its own unwind boundary so one failing effect
    /// or listener does not starve its siblings.
    pub isolate_dependents: bool,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make every write fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_write_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_write_depth"));
        }
        if self.max_effect_runs == 0 {
            return Err(ConfigError::ZeroLimit("max_effect_runs"));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_write_depth: 64,
            max_effect_runs: 100,
            isolate_dependents: true,
        }
    }
}
