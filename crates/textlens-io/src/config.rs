//! Runtime configuration for the reprocessing coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use textlens_pipeline::{PipelineConfig, PipelineError};

/// Coordinator settings.
///
/// Every field has a default, so a partial JSON object such as
/// `{"busy_debounce_ms": 100}` is a valid config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pixel pipeline settings.
    pub pipeline: PipelineConfig,

    /// Debounce before recomputing when nothing is running (milliseconds).
    pub idle_debounce_ms: u64,

    /// Debounce before recomputing while an attempt is in flight
    /// (milliseconds). Rapid edits inside this window collapse into one
    /// recomputation.
    pub busy_debounce_ms: u64,
}

impl CoordinatorConfig {
    /// Default idle debounce.
    pub const DEFAULT_IDLE_DEBOUNCE_MS: u64 = 0;

    /// Default busy debounce.
    pub const DEFAULT_BUSY_DEBOUNCE_MS: u64 = 250;

    /// Idle debounce as a [`Duration`].
    #[must_use]
    pub const fn idle_debounce(&self) -> Duration {
        Duration::from_millis(self.idle_debounce_ms)
    }

    /// Busy debounce as a [`Duration`].
    #[must_use]
    pub const fn busy_debounce(&self) -> Duration {
        Duration::from_millis(self.busy_debounce_ms)
    }

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the pipeline section
    /// is invalid.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline.validate()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            idle_debounce_ms: Self::DEFAULT_IDLE_DEBOUNCE_MS,
            busy_debounce_ms: Self::DEFAULT_BUSY_DEBOUNCE_MS,
        }
    }
}
