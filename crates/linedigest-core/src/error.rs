//! Error types for the LineDigest pipeline.

use thiserror::Error;

/// Fatal errors that abort a pipeline run.
///
/// Each variant names the failing operation so the five failure kinds
/// (input stream, output sink, backend setup, backend execution and host
/// memory) stay distinguishable in the user-facing message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input stream error while {operation}: {source}")]
    Stream {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output error while {operation}: {source}")]
    Output {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend setup failed: {0}")]
    BackendSetup(#[source] BackendError),

    #[error("backend execution failed for batch {batch} ({records} records): {source}")]
    BackendExecution {
        batch: u64,
        records: usize,
        #[source]
        source: BackendError,
    },

    #[error("resource exhausted: could not allocate {bytes} bytes for {records} records")]
    ResourceExhausted { bytes: usize, records: usize },

    #[error("record {index} is {len} bytes, larger than a backend can address")]
    RecordTooLarge { index: u64, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn read(index: u64, source: std::io::Error) -> Self {
        Self::Stream {
            operation: format!("reading record {index}"),
            source,
        }
    }

    pub fn write(source: std::io::Error) -> Self {
        Self::Output {
            operation: "writing digests".into(),
            source,
        }
    }

    /// Returns `true` if halving the batch may let the run continue.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

/// Errors reported by a compute backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no usable compute device: {0}")]
    Unavailable(String),

    #[error("{backend}: {reason}")]
    Setup { backend: String, reason: String },

    #[error("{backend}: {reason}")]
    Execution { backend: String, reason: String },
}

impl BackendError {
    pub fn setup(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::Setup {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    pub fn execution(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::Execution {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Execution failures are the only kind worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}
