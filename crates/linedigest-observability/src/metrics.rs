//! LineDigest metrics definitions.
//!
//! All metrics use OpenTelemetry conventions. Without an installed meter
//! provider the global meter is a no-op, so recording is always safe.

use linedigest_core::{BackendInfo, BatchObserver, BatchReport};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Central metrics handle for a pipeline run.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub records_digested: Counter<u64>,
    pub batches: Counter<u64>,
    pub batch_size: Histogram<u64>,
    pub compute_ms: Histogram<f64>,
    pub stride_bytes: Histogram<u64>,
    attributes: Vec<KeyValue>,
}

impl PipelineMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            records_digested: meter
                .u64_counter("linedigest.records_digested")
                .with_description("Total number of records digested")
                .init(),
            batches: meter
                .u64_counter("linedigest.batches")
                .with_description("Batches dispatched to the backend")
                .init(),
            batch_size: meter
                .u64_histogram("linedigest.batch_size")
                .with_description("Number of records in a dispatched batch")
                .init(),
            compute_ms: meter
                .f64_histogram("linedigest.compute_ms")
                .with_description("Backend compute time per batch in milliseconds")
                .init(),
            stride_bytes: meter
                .u64_histogram("linedigest.stride_bytes")
                .with_description("Slot width of a packed batch in bytes")
                .init(),
            attributes: Vec::new(),
        }
    }

    /// Instruments on the global meter named "linedigest".
    pub fn global() -> Self {
        Self::new(&global::meter("linedigest"))
    }

    /// Tag every measurement with the backend kind and algorithm.
    pub fn with_backend(mut self, info: &BackendInfo) -> Self {
        self.attributes = vec![
            KeyValue::new("backend", info.kind),
            KeyValue::new("algorithm", info.algorithm.name()),
        ];
        self
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn record_batch(&self, report: &BatchReport) {
        let attrs = self.attributes.as_slice();
        self.records_digested.add(report.records as u64, attrs);
        self.batches.add(1, attrs);
        self.batch_size.record(report.records as u64, attrs);
        self.stride_bytes.record(report.stride as u64, attrs);
        if let Some(elapsed) = report.elapsed {
            self.compute_ms.record(elapsed.as_secs_f64() * 1e3, attrs);
        }
    }
}

impl BatchObserver for PipelineMetrics {
    fn on_batch(&self, report: &BatchReport) {
        self.record_batch(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linedigest_core::Algorithm;
    use std::time::Duration;

    #[test]
    fn records_on_noop_meter_and_tags_backend() {
        let info = BackendInfo {
            kind: "cpu",
            device: "threads=4".into(),
            algorithm: Algorithm::Sha512,
        };
        let metrics = PipelineMetrics::global().with_backend(&info);
        assert_eq!(metrics.attributes().len(), 2);
        assert_eq!(metrics.attributes()[0].key.as_str(), "backend");
        assert_eq!(metrics.attributes()[1].value.as_str(), "sha512");

        let report = BatchReport {
            index: 1,
            start: 0,
            records: 10,
            max_len: 70,
            stride: 128,
            bytes: 1280,
            elapsed: Some(Duration::from_micros(250)),
        };
        metrics.on_batch(&report);
        metrics.on_batch(&BatchReport { elapsed: None, ..report });
    }
}
