//! Pipeline configuration.

use linedigest_core::batch::{check_alignment, BLOCK_ALIGNMENT};
use linedigest_core::PipelineError;
use serde::{Deserialize, Serialize};

/// Tunables for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max records per batch. Peak host memory is roughly
    /// `batch_capacity * stride` of the widest batch.
    #[serde(default = "default_batch_capacity")]
    pub batch_capacity: usize,
    /// Optional cap on the packed buffer size; a batch is closed early
    /// rather than exceed it. A single record always fits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_bytes: Option<usize>,
    /// Slot alignment in bytes; must be a positive multiple of 64.
    #[serde(default = "default_alignment")]
    pub alignment: usize,
    /// Fill and pack the next batch while the current one is dispatched.
    #[serde(default)]
    pub overlap: bool,
    /// Packed batches allowed to wait for the backend in overlap mode.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Halve and retry batches that fail to allocate or dispatch.
    #[serde(default = "bool_true")]
    pub retry_failed_batches: bool,
}

fn default_batch_capacity() -> usize {
    1 << 20
}

fn default_alignment() -> usize {
    BLOCK_ALIGNMENT
}

fn default_queue_depth() -> usize {
    1
}

fn bool_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_capacity: default_batch_capacity(),
            max_batch_bytes: None,
            alignment: default_alignment(),
            overlap: false,
            queue_depth: default_queue_depth(),
            retry_failed_batches: true,
        }
    }
}

impl PipelineConfig {
    pub fn batch_capacity(mut self, n: usize) -> Self {
        self.batch_capacity = n;
        self
    }

    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = Some(bytes);
        self
    }

    pub fn overlap(mut self, on: bool) -> Self {
        self.overlap = on;
        self
    }

    pub fn retry_failed_batches(mut self, on: bool) -> Self {
        self.retry_failed_batches = on;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_capacity == 0 {
            return Err(PipelineError::Config("batch_capacity must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(PipelineError::Config("queue_depth must be at least 1".into()));
        }
        if self.max_batch_bytes == Some(0) {
            return Err(PipelineError::Config("max_batch_bytes must be positive".into()));
        }
        check_alignment(self.alignment)
    }
}
