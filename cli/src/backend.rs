//! Backend construction from `BackendConfig`.

use crate::config::{BackendConfig, BackendKind};
use linedigest_core::{CpuBackend, DigestBackend, PipelineError};

pub fn build(config: &BackendConfig) -> Result<Box<dyn DigestBackend>, PipelineError> {
    match config.kind {
        BackendKind::Cpu => {
            let backend = CpuBackend::new(config.algorithm, config.threads)
                .map_err(PipelineError::BackendSetup)?;
            Ok(Box::new(backend))
        }
        BackendKind::Opencl => opencl(config),
    }
}

#[cfg(feature = "opencl")]
fn opencl(config: &BackendConfig) -> Result<Box<dyn DigestBackend>, PipelineError> {
    use linedigest_core::{OpenClBackend, OpenClConfig};

    let mut cl = OpenClConfig::default();
    if let Some(path) = &config.kernel {
        cl.kernel_path = path.clone();
    }
    if let Some(name) = &config.kernel_name {
        cl.kernel_name = name.clone();
    }
    cl.build_options = config.build_options.clone();

    let backend = OpenClBackend::new(config.algorithm, &cl).map_err(PipelineError::BackendSetup)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "opencl"))]
fn opencl(_config: &BackendConfig) -> Result<Box<dyn DigestBackend>, PipelineError> {
    Err(PipelineError::BackendSetup(
        linedigest_core::BackendError::Unavailable(
            "this build has no OpenCL support (rebuild with --features opencl)".into(),
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use linedigest_core::Algorithm;

    #[test]
    fn builds_cpu_backend() {
        let config = BackendConfig {
            algorithm: Algorithm::Sha512,
            threads: 2,
            ..Default::default()
        };
        let backend = build(&config).unwrap();
        assert_eq!(backend.info().kind, "cpu");
        assert_eq!(backend.algorithm(), Algorithm::Sha512);
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn opencl_without_feature_is_a_setup_error() {
        let config = BackendConfig {
            kind: BackendKind::Opencl,
            ..Default::default()
        };
        let err = build(&config).err().unwrap();
        assert!(matches!(err, PipelineError::BackendSetup(_)));
        assert!(err.to_string().contains("OpenCL"));
    }
}
