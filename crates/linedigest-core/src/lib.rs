//! # linedigest-core
//!
//! Core types shared by every LineDigest crate: the streaming record
//! reader, the fixed-stride batch packer, the digest unpacker and the
//! `DigestBackend` seam that parallel compute backends plug into.
//!
//! ## Data flow
//! ```text
//! RecordReader (one line at a time)
//!       │
//!       ▼
//! PendingBatch ──pack──▶ Batch { buffer, lengths, stride }
//!                              │
//!                              ▼
//!                 DigestBackend::dispatch (one invocation per record)
//!                              │
//!                              ▼
//!                 Vec<Digest> ──to_hex──▶ output lines
//! ```

pub mod backend;
pub mod batch;
pub mod cpu;
pub mod digest;
pub mod error;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod record;

pub use backend::{BackendInfo, BatchObserver, BatchReport, DigestBackend, DispatchOutput};
pub use batch::{stride_for, Batch, PendingBatch, BLOCK_ALIGNMENT};
pub use cpu::CpuBackend;
pub use digest::{to_hex, Algorithm, Digest};
pub use error::{BackendError, PipelineError};
#[cfg(feature = "opencl")]
pub use opencl::{OpenClBackend, OpenClConfig};
pub use record::RecordReader;
