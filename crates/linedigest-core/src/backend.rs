//! The `DigestBackend` trait and batch reporting types.
//!
//! A backend is an explicitly constructed, owned object: construction is
//! the one-time setup (device selection, kernel compilation, thread pool),
//! `dispatch` runs one parallel job per batch, and `Drop` releases it.

use crate::batch::Batch;
use crate::digest::{Algorithm, Digest};
use crate::error::BackendError;
use serde::Serialize;
use std::time::Duration;

/// Describes a configured backend for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    /// Backend kind, e.g. "cpu" or "opencl".
    pub kind: &'static str,
    /// Device description, e.g. a GPU name or "threads=8".
    pub device: String,
    pub algorithm: Algorithm,
}

/// Result of one batch dispatch.
#[derive(Debug)]
pub struct DispatchOutput {
    /// One digest per record, in slot order.
    pub digests: Vec<Digest>,
    /// Compute time reported by the backend for the whole batch.
    pub elapsed: Option<Duration>,
}

/// A parallel digest capability.
///
/// Each dispatch computes one digest per record. Invocation `i` reads only
/// `batch.buffer()[i * stride .. i * stride + lengths[i]]` and produces only
/// digest `i`; there is no cross-record state.
pub trait DigestBackend: Send {
    fn info(&self) -> BackendInfo;

    fn algorithm(&self) -> Algorithm;

    /// Run one synchronous parallel job over `batch`.
    fn dispatch(&mut self, batch: &Batch) -> Result<DispatchOutput, BackendError>;
}

impl<B: DigestBackend + ?Sized> DigestBackend for Box<B> {
    fn info(&self) -> BackendInfo {
        (**self).info()
    }

    fn algorithm(&self) -> Algorithm {
        (**self).algorithm()
    }

    fn dispatch(&mut self, batch: &Batch) -> Result<DispatchOutput, BackendError> {
        (**self).dispatch(batch)
    }
}

/// Per-batch figures handed to observers after a batch is drained.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// 1-based batch sequence number.
    pub index: u64,
    /// Global index of the first record.
    pub start: u64,
    pub records: usize,
    pub max_len: usize,
    pub stride: usize,
    pub bytes: usize,
    pub elapsed: Option<Duration>,
}

impl BatchReport {
    /// Digests per second over the backend-reported compute time.
    pub fn hashes_per_second(&self) -> Option<f64> {
        let secs = self.elapsed?.as_secs_f64();
        (secs > 0.0).then(|| self.records as f64 / secs)
    }
}

/// Receives a report after every drained batch.
pub trait BatchObserver: Send + Sync {
    fn on_batch(&self, report: &BatchReport);
}

/// Blanket impl so closures can be used as observers.
impl<F: Fn(&BatchReport) + Send + Sync> BatchObserver for F {
    fn on_batch(&self, report: &BatchReport) {
        self(report)
    }
}
