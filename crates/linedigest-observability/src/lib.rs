//! # linedigest-observability
//!
//! OpenTelemetry-based observability for LineDigest.
//!
//! ## Built-in metrics
//! - `linedigest.records_digested`: counter, tagged with backend + algorithm
//! - `linedigest.batches`         : counter
//! - `linedigest.batch_size`      : histogram, records per batch
//! - `linedigest.compute_ms`      : histogram, backend time per batch
//! - `linedigest.stride_bytes`    : histogram, slot width per batch
//!
//! ## Structured logging
//! Human-readable or JSON logs on stderr, so digests written to stdout stay
//! clean. Log levels configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::PipelineMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
