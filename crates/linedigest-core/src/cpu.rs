//! Rayon-powered CPU backend.
//!
//! Runs one independent digest invocation per record on a dedicated thread
//! pool, reading each record straight out of its slot in the packed buffer.

use crate::backend::{BackendInfo, DigestBackend, DispatchOutput};
use crate::batch::Batch;
use crate::digest::{Algorithm, Digest};
use crate::error::BackendError;
use rayon::prelude::*;
use sha2::{Digest as _, Sha256, Sha512};
use std::time::Instant;
use tracing::{debug, info};

const BACKEND: &str = "cpu";

/// CPU digest backend backed by a private Rayon pool.
pub struct CpuBackend {
    algorithm: Algorithm,
    pool: rayon::ThreadPool,
}

impl CpuBackend {
    /// Build the backend. `threads == 0` uses one thread per logical CPU.
    pub fn new(algorithm: Algorithm, threads: usize) -> Result<Self, BackendError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("linedigest-cpu-{i}"))
            .build()
            .map_err(|e| BackendError::setup(BACKEND, e))?;

        info!(
            "CpuBackend: algorithm={} threads={}",
            algorithm,
            pool.current_num_threads()
        );
        Ok(Self { algorithm, pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Digest one record and convert it to the native word layout.
fn digest_record(algorithm: Algorithm, bytes: &[u8]) -> Option<Digest> {
    match algorithm {
        Algorithm::Sha256 => Digest::from_be_bytes(algorithm, &Sha256::digest(bytes)),
        Algorithm::Sha512 => Digest::from_be_bytes(algorithm, &Sha512::digest(bytes)),
    }
}

impl DigestBackend for CpuBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BACKEND,
            device: format!("threads={}", self.threads()),
            algorithm: self.algorithm,
        }
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn dispatch(&mut self, batch: &Batch) -> Result<DispatchOutput, BackendError> {
        let algorithm = self.algorithm;
        let started = Instant::now();

        let digests: Option<Vec<Digest>> = self.pool.install(|| {
            (0..batch.len())
                .into_par_iter()
                .map(|i| digest_record(algorithm, batch.record(i)))
                .collect()
        });

        let elapsed = started.elapsed();
        let digests = digests.ok_or_else(|| {
            BackendError::execution(BACKEND, "digest output had an unexpected size")
        })?;

        debug!(
            "CpuBackend: {} records (stride {}) in {:?}",
            batch.len(),
            batch.stride(),
            elapsed
        );

        Ok(DispatchOutput {
            digests,
            elapsed: Some(elapsed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{PendingBatch, BLOCK_ALIGNMENT};

    const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const SHA256_HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const SHA512_EMPTY: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
                                47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";
    const SHA512_ABC: &str = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                              2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";

    fn run(algorithm: Algorithm, records: &[&[u8]]) -> Vec<String> {
        let mut pending = PendingBatch::new(0);
        for r in records {
            pending.push(r).unwrap();
        }
        let batch = pending.pack(BLOCK_ALIGNMENT).unwrap();
        let mut backend = CpuBackend::new(algorithm, 2).unwrap();
        let out = backend.dispatch(&batch).unwrap();
        assert!(out.elapsed.is_some());
        out.digests.iter().map(|d| d.to_hex()).collect()
    }

    #[test]
    fn sha256_known_vectors() {
        let hex = run(Algorithm::Sha256, &[b"abc", b"", b"hello"]);
        assert_eq!(hex, vec![SHA256_ABC, SHA256_EMPTY, SHA256_HELLO]);
    }

    #[test]
    fn sha512_known_vectors() {
        let hex = run(Algorithm::Sha512, &[b"abc", b""]);
        assert_eq!(hex, vec![SHA512_ABC, SHA512_EMPTY]);
    }

    #[test]
    fn padding_does_not_leak_into_digest() {
        // "abc" shares a 128-byte stride with a long record
        let long = vec![b'z'; 100];
        let hex = run(Algorithm::Sha256, &[&long, b"abc"]);
        assert_eq!(hex[1], SHA256_ABC);
    }

    #[test]
    fn reports_backend_info() {
        let backend = CpuBackend::new(Algorithm::Sha512, 3).unwrap();
        let info = backend.info();
        assert_eq!(info.kind, "cpu");
        assert_eq!(info.device, "threads=3");
        assert_eq!(info.algorithm, Algorithm::Sha512);
    }

    #[test]
    fn single_thread_pool_is_described_without_plural() {
        let backend = CpuBackend::new(Algorithm::Sha256, 1).unwrap();
        assert_eq!(backend.threads(), 1);
        assert_eq!(backend.info().device, "threads=1");
    }
}
