//! Single-digest mode: the whole input is one record.

use linedigest_core::{BackendError, Digest, DigestBackend, PendingBatch, PipelineError};
use std::io::ErrorKind;
use tracing::info;

/// Digest `data` as a single record on `backend`.
///
/// Empty input is rejected rather than hashed, so a missing or truncated
/// file never silently yields the digest of the empty string.
pub fn digest_whole<B: DigestBackend + ?Sized>(
    backend: &mut B,
    data: &[u8],
    alignment: usize,
) -> Result<Digest, PipelineError> {
    if data.is_empty() {
        return Err(PipelineError::Stream {
            operation: "reading input".into(),
            source: std::io::Error::new(ErrorKind::InvalidData, "input is empty"),
        });
    }

    let mut pending = PendingBatch::new(0);
    pending.push(data)?;
    let batch = pending.pack(alignment)?;
    info!(
        "Whole-input digest: {} bytes, stride_bytes={}",
        data.len(),
        batch.stride()
    );

    let fatal = |source| PipelineError::BackendExecution {
        batch: 1,
        records: 1,
        source,
    };
    let out = backend.dispatch(&batch).map_err(fatal)?;
    if let Some(ms) = out.elapsed.map(|d| d.as_secs_f64() * 1e3) {
        info!("Whole-input digest: kernel time = {ms:.3} ms");
    }

    out.digests.into_iter().next().ok_or_else(|| {
        fatal(BackendError::execution(
            backend.info().kind,
            "returned no digest for a one-record batch",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use linedigest_core::{Algorithm, CpuBackend, BLOCK_ALIGNMENT};

    #[test]
    fn digests_whole_buffer_including_newlines() {
        let mut backend = CpuBackend::new(Algorithm::Sha256, 1).unwrap();
        let d = digest_whole(&mut backend, b"abc\nhello\n", BLOCK_ALIGNMENT).unwrap();
        let expected = hex::encode(<sha2::Sha256 as sha2::Digest>::digest(b"abc\nhello\n"));
        assert_eq!(d.to_hex(), expected);
    }

    #[test]
    fn rejects_empty_input() {
        let mut backend = CpuBackend::new(Algorithm::Sha256, 1).unwrap();
        let err = digest_whole(&mut backend, b"", BLOCK_ALIGNMENT).unwrap_err();
        assert!(matches!(err, PipelineError::Stream { .. }));
        assert!(err.to_string().contains("input is empty"));
    }
}
