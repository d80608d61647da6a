//! # linedigest-batch
//!
//! Memory-bounded streaming driver: reads newline-delimited records, packs
//! them into fixed-stride batches and hands each batch to a `DigestBackend`,
//! writing one hex digest per record in input order.
//!
//! ## Features
//! - Bounded batches (default 1,048,576 records) with an optional byte budget
//! - Overlap mode: the next batch is filled while the current one computes
//! - One split-and-retry on backend failure, halving on allocation failure
//! - Per-batch and total throughput logged through `tracing`
//!
//! ## Usage
//! ```no_run
//! use linedigest_batch::{PipelineConfig, PipelineDriver};
//! use linedigest_core::{Algorithm, CpuBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = CpuBackend::new(Algorithm::Sha256, 0)?;
//! let mut driver = PipelineDriver::new(PipelineConfig::default(), backend)?;
//! // `run` also honours `overlap`, but then the reader must be `Send`.
//! let stdin = std::io::stdin().lock();
//! let stats = driver.run_sequential(stdin, std::io::stdout().lock())?;
//! eprintln!("{} records", stats.records);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod fill;
pub mod stats;
pub mod whole;

pub use config::PipelineConfig;
pub use engine::PipelineDriver;
pub use stats::PipelineStats;
pub use whole::digest_whole;
