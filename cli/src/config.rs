//! `linedigest.yaml`: pipeline, backend and log sections, all optional.
//!
//! ```yaml
//! pipeline:
//!   batch_capacity: 1048576
//!   max_batch_bytes: 268435456
//!   overlap: true
//! backend:
//!   kind: opencl
//!   algorithm: sha256
//!   kernel: kernels/sha256_wrapper.cl
//! log:
//!   level: info
//!   components:
//!     linedigest-batch: debug
//! ```

use anyhow::{Context, Result};
use clap::ValueEnum;
use linedigest_batch::PipelineConfig;
use linedigest_core::Algorithm;
use linedigest_observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Rayon thread pool on the host
    #[default]
    Cpu,
    /// OpenCL device (GPU preferred); needs the `opencl` feature
    Opencl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// CPU worker threads; 0 = one per logical CPU.
    #[serde(default)]
    pub threads: usize,
    /// OpenCL kernel source path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<PathBuf>,
    /// OpenCL kernel entry point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
    #[serde(default)]
    pub build_options: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid config '{}'", path.display()))
    }
}
