//! Cumulative throughput statistics.

use linedigest_core::BatchReport;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Running totals for one pipeline run. Only ever increases.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub records: u64,
    pub batches: u64,
    /// Packed bytes handed to the backend.
    pub bytes: u64,
    /// Sum of backend-reported compute time.
    pub compute_time: Duration,
    /// Host wall-clock time for the whole run.
    pub wall_time: Duration,
    /// Batches that needed a split or re-dispatch.
    pub retries: u64,
}

impl PipelineStats {
    pub fn record_batch(&mut self, report: &BatchReport) {
        self.records += report.records as u64;
        self.batches += 1;
        self.bytes += report.bytes as u64;
        if let Some(elapsed) = report.elapsed {
            self.compute_time += elapsed;
        }
    }

    /// Digests per second of backend compute time.
    pub fn hashes_per_second(&self) -> Option<f64> {
        let secs = self.compute_time.as_secs_f64();
        (self.records > 0 && secs > 0.0).then(|| self.records as f64 / secs)
    }

    pub fn log_total(&self) {
        let hps = self.hashes_per_second().unwrap_or(0.0);
        info!(
            "TOTAL: records = {}, batches = {}, kernel time = {:.3} ms, speed = {:.2} MH/s ({:.3e} H/s), wall = {:.3} s",
            self.records,
            self.batches,
            self.compute_time.as_secs_f64() * 1e3,
            hps / 1e6,
            hps,
            self.wall_time.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(records: usize, ms: u64) -> BatchReport {
        BatchReport {
            index: 1,
            start: 0,
            records,
            max_len: 3,
            stride: 64,
            bytes: records * 64,
            elapsed: Some(Duration::from_millis(ms)),
        }
    }

    #[test]
    fn accumulates_batches() {
        let mut stats = PipelineStats::default();
        stats.record_batch(&report(1000, 10));
        stats.record_batch(&report(500, 5));
        assert_eq!(stats.records, 1500);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.bytes, 1500 * 64);
        assert_eq!(stats.compute_time, Duration::from_millis(15));
        let hps = stats.hashes_per_second().unwrap();
        assert!((hps - 100_000.0).abs() < 1.0);
    }

    #[test]
    fn no_rate_without_compute_time() {
        let stats = PipelineStats::default();
        assert!(stats.hashes_per_second().is_none());
    }
}
