use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    DEFAULT_KERNEL_SIZE, DEFAULT_PRESENTER_QUEUE_CAPACITY, DEFAULT_TRANSIENT_RETRY_DELAY_MS,
};
use crate::shared::error::PipelineError;

/// Tuning knobs for a pipeline run. Every field has a default, so a settings
/// file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub kernel_size: usize,
    pub presenter_queue_capacity: usize,
    pub transient_retry_delay_ms: u64,
    pub max_frames: Option<usize>,
    pub snapshot_every: usize,
    pub progress_every: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            kernel_size: DEFAULT_KERNEL_SIZE,
            presenter_queue_capacity: DEFAULT_PRESENTER_QUEUE_CAPACITY,
            transient_retry_delay_ms: DEFAULT_TRANSIENT_RETRY_DELAY_MS,
            max_frames: None,
            snapshot_every: 1,
            progress_every: 100,
        }
    }
}

impl PipelineSettings {
    /// Reads settings from a JSON file and validates them.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let json = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json).map_err(|e| {
            PipelineError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "kernel size must be a positive odd integer, got {}",
                self.kernel_size
            )));
        }
        if self.presenter_queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "presenter queue capacity must be at least 1".to_string(),
            ));
        }
        if self.snapshot_every == 0 {
            return Err(PipelineError::InvalidConfig(
                "snapshot interval must be at least 1".to_string(),
            ));
        }
        if self.max_frames == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "frame limit must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}
