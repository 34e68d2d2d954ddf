//! Frame driver configuration.
//!
//! [`FrameConfig`] is plain serde data so that an editor session can ship it
//! as JSON next to its scene files. Every field has a default; an empty JSON
//! object is a valid configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What the frame driver does when a controller's `update` returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the frame at the failing controller. Later controllers do not run
    /// and queued commands are discarded.
    Abort,
    /// Log the failure and keep going with the next controller.
    #[default]
    Isolate,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_elapsed must be positive and finite, got {0}")]
    InvalidMaxElapsed(f64),
}

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Upper bound, in seconds, on the elapsed time handed to controllers.
    /// Long stalls (a blocked tab, a debugger pause) are clamped to this.
    pub max_elapsed: f64,
    pub failure_policy: FailurePolicy,
    /// Default `tracing` directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Seed for the manager's external-id generator.
    pub id_seed: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_elapsed: 0.25,
            failure_policy: FailurePolicy::Isolate,
            log_filter: "warn".to_owned(),
            id_seed: 0,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_elapsed.is_finite() && self.max_elapsed > 0.0) {
            return Err(ConfigError::InvalidMaxElapsed(self.max_elapsed));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading frame config {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("loading frame config {}", path.display()))
    }

    /// Clamp a raw elapsed time into `[0, max_elapsed]`. Non-finite and
    /// negative values become 0.
    pub fn clamp_elapsed(&self, elapsed: f64) -> f64 {
        if elapsed.is_finite() {
            elapsed.clamp(0.0, self.max_elapsed)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
