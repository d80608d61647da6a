//! The pipeline driver: Filling → Dispatching → Draining, one batch at a time.

use crate::config::PipelineConfig;
use crate::fill::{pack_batches, Filler};
use crate::stats::PipelineStats;
use linedigest_core::{
    BackendError, Batch, BatchObserver, BatchReport, DigestBackend, DispatchOutput, PipelineError,
    RecordReader,
};
use std::io::{BufRead, Write};
use std::sync::{mpsc, Arc};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Streams records through a `DigestBackend` and writes one hex digest
/// per record, in input order.
pub struct PipelineDriver<B> {
    config: PipelineConfig,
    backend: B,
    observers: Vec<Arc<dyn BatchObserver>>,
}

impl<B: DigestBackend> PipelineDriver<B> {
    pub fn new(config: PipelineConfig, backend: B) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            observers: Vec::new(),
        })
    }

    /// Register an observer called after every drained batch.
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the pipeline until `input` is exhausted, in overlap mode when
    /// the config asks for it.
    ///
    /// On failure the partial statistics are logged before the error is
    /// returned; digests of the failing batch are never written.
    pub fn run<R, W>(&mut self, input: R, output: W) -> Result<PipelineStats, PipelineError>
    where
        R: BufRead + Send,
        W: Write,
    {
        if self.config.overlap {
            self.run_with(true, output, |driver, out, stats| {
                driver.drive_overlapped(input, out, stats)
            })
        } else {
            self.run_sequential(input, output)
        }
    }

    /// Run on the calling thread only, ignoring `overlap`. The reader does
    /// not need to be `Send`, so a `StdinLock` works here.
    pub fn run_sequential<R, W>(
        &mut self,
        input: R,
        output: W,
    ) -> Result<PipelineStats, PipelineError>
    where
        R: BufRead,
        W: Write,
    {
        self.run_with(false, output, |driver, out, stats| {
            driver.drive_sequential(input, out, stats)
        })
    }

    fn run_with<W, F>(
        &mut self,
        overlap: bool,
        mut output: W,
        drive: F,
    ) -> Result<PipelineStats, PipelineError>
    where
        W: Write,
        F: FnOnce(&mut Self, &mut W, &mut PipelineStats) -> Result<(), PipelineError>,
    {
        let info = self.backend.info();
        info!(
            "Pipeline starting: backend={} device='{}' algorithm={} batch_capacity={} overlap={}",
            info.kind, info.device, info.algorithm, self.config.batch_capacity, overlap
        );

        let started = Instant::now();
        let mut stats = PipelineStats::default();
        let result = drive(self, &mut output, &mut stats);
        let result = result.and_then(|()| output.flush().map_err(PipelineError::write));
        stats.wall_time = started.elapsed();

        match result {
            Ok(()) => {
                stats.log_total();
                Ok(stats)
            }
            Err(e) => {
                error!("Pipeline aborted after {} records: {}", stats.records, e);
                stats.log_total();
                Err(e)
            }
        }
    }

    fn drive_sequential<R, W>(
        &mut self,
        input: R,
        output: &mut W,
        stats: &mut PipelineStats,
    ) -> Result<(), PipelineError>
    where
        R: BufRead,
        W: Write,
    {
        let alignment = self.config.alignment;
        let adaptive = self.config.retry_failed_batches;
        let mut filler = Filler::new(RecordReader::new(input), &self.config);

        while let Some(pending) = filler.next_batch()? {
            pack_batches(&pending, alignment, adaptive, &mut |batch| {
                self.process(batch, output, stats)
            })?;
        }
        Ok(())
    }

    /// Overlap mode: a scoped producer thread fills and packs batch N+1
    /// while this thread dispatches and drains batch N. The bounded FIFO
    /// channel keeps batches, and therefore output lines, in input order.
    fn drive_overlapped<R, W>(
        &mut self,
        input: R,
        output: &mut W,
        stats: &mut PipelineStats,
    ) -> Result<(), PipelineError>
    where
        R: BufRead + Send,
        W: Write,
    {
        let alignment = self.config.alignment;
        let adaptive = self.config.retry_failed_batches;
        let mut filler = Filler::new(RecordReader::new(input), &self.config);
        let (tx, rx) = mpsc::sync_channel::<Result<Batch, PipelineError>>(self.config.queue_depth);

        std::thread::scope(|scope| {
            scope.spawn(move || {
                if let Err(e) = produce(&mut filler, alignment, adaptive, &tx) {
                    let _ = tx.send(Err(e));
                }
            });

            // Returning early drops `rx`, which unblocks and stops the producer.
            for item in rx {
                self.process(item?, output, stats)?;
            }
            Ok(())
        })
    }

    /// Dispatch one packed batch and drain its digests to `output`.
    fn process<W: Write>(
        &mut self,
        batch: Batch,
        output: &mut W,
        stats: &mut PipelineStats,
    ) -> Result<(), PipelineError> {
        let mut report = BatchReport {
            index: stats.batches + 1,
            start: batch.start(),
            records: batch.len(),
            max_len: batch.max_len(),
            stride: batch.stride(),
            bytes: batch.size_bytes(),
            elapsed: None,
        };
        debug!(
            "Batch {}: {} records, max_len={}, stride_bytes={} (msg_stride={})",
            report.index,
            report.records,
            report.max_len,
            report.stride,
            batch.stride_words()
        );

        let dispatched = self.dispatch_with_retry(batch, report.index, stats)?;
        if dispatched.digests.len() != report.records {
            return Err(PipelineError::BackendExecution {
                batch: report.index,
                records: report.records,
                source: BackendError::execution(
                    self.backend.info().kind,
                    format!(
                        "returned {} digests for {} records",
                        dispatched.digests.len(),
                        report.records
                    ),
                ),
            });
        }
        report.elapsed = dispatched.elapsed;

        if report.index == 1 {
            if let Some(first) = dispatched.digests.first() {
                debug!("First record {} = {}", first.algorithm(), first);
            }
        }

        for digest in &dispatched.digests {
            writeln!(output, "{digest}").map_err(PipelineError::write)?;
        }

        stats.record_batch(&report);
        match report.hashes_per_second() {
            Some(hps) => info!(
                "Batch {}: {} records, kernel time = {:.3} ms, speed = {:.2} MH/s ({:.3e} H/s)",
                report.index,
                report.records,
                report.elapsed.unwrap_or_default().as_secs_f64() * 1e3,
                hps / 1e6,
                hps
            ),
            None => info!("Batch {}: {} records", report.index, report.records),
        }
        for observer in &self.observers {
            observer.on_batch(&report);
        }
        Ok(())
    }

    /// One dispatch, and on an execution failure a single retry: the batch
    /// is split in half (or re-sent whole if it holds one record) and each
    /// part dispatched once more. A second failure is fatal.
    fn dispatch_with_retry(
        &mut self,
        batch: Batch,
        index: u64,
        stats: &mut PipelineStats,
    ) -> Result<DispatchOutput, PipelineError> {
        let records = batch.len();
        let fatal = |source| PipelineError::BackendExecution {
            batch: index,
            records,
            source,
        };

        let err = match self.backend.dispatch(&batch) {
            Ok(out) => return Ok(out),
            Err(e) if self.config.retry_failed_batches && e.is_retryable() => e,
            Err(e) => return Err(fatal(e)),
        };

        stats.retries += 1;
        if records < 2 {
            warn!("Batch {index}: {err}; retrying once");
            return self.backend.dispatch(&batch).map_err(fatal);
        }

        let mid = records / 2;
        warn!(
            "Batch {index}: {err}; retrying as two halves of {mid} and {}",
            records - mid
        );
        let (head, tail) = batch.split_at(mid);
        let mut first = self.backend.dispatch(&head).map_err(fatal)?;
        drop(head);
        let second = self.backend.dispatch(&tail).map_err(fatal)?;

        first.digests.extend(second.digests);
        let elapsed = match (first.elapsed, second.elapsed) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        Ok(DispatchOutput {
            digests: first.digests,
            elapsed,
        })
    }
}

/// Producer side of overlap mode. Stops quietly once the consumer is gone.
fn produce<R: BufRead>(
    filler: &mut Filler<R>,
    alignment: usize,
    adaptive: bool,
    tx: &mpsc::SyncSender<Result<Batch, PipelineError>>,
) -> Result<(), PipelineError> {
    while let Some(pending) = filler.next_batch()? {
        let mut disconnected = false;
        pack_batches(&pending, alignment, adaptive, &mut |batch| {
            if !disconnected && tx.send(Ok(batch)).is_err() {
                disconnected = true;
            }
            Ok(())
        })?;
        if disconnected {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linedigest_core::{Algorithm, BackendInfo, CpuBackend};
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read};
    use std::marker::PhantomData;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the CPU backend and fails the dispatches scripted in `plan`
    /// (`true` = fail), passing through once the plan runs out.
    struct FlakyBackend {
        inner: CpuBackend,
        plan: VecDeque<bool>,
        dispatched: Vec<usize>,
    }

    impl FlakyBackend {
        fn new(plan: &[bool]) -> Self {
            Self {
                inner: CpuBackend::new(Algorithm::Sha256, 1).unwrap(),
                plan: plan.iter().copied().collect(),
                dispatched: Vec::new(),
            }
        }
    }

    impl DigestBackend for FlakyBackend {
        fn info(&self) -> BackendInfo {
            self.inner.info()
        }

        fn algorithm(&self) -> Algorithm {
            self.inner.algorithm()
        }

        fn dispatch(&mut self, batch: &Batch) -> Result<DispatchOutput, BackendError> {
            self.dispatched.push(batch.len());
            if self.plan.pop_front().unwrap_or(false) {
                return Err(BackendError::execution("flaky", "device lost"));
            }
            self.inner.dispatch(batch)
        }
    }

    const INPUT: &str = "abc\n\nhello\n";
    const EXPECTED: &str = "\
ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
";

    fn run(
        driver: &mut PipelineDriver<FlakyBackend>,
    ) -> Result<(PipelineStats, String), PipelineError> {
        let mut out = Vec::new();
        let stats = driver.run(Cursor::new(INPUT), &mut out)?;
        Ok((stats, String::from_utf8(out).unwrap()))
    }

    #[test]
    fn failed_batch_is_retried_as_two_halves() {
        let mut driver =
            PipelineDriver::new(PipelineConfig::default(), FlakyBackend::new(&[true])).unwrap();
        let (stats, out) = run(&mut driver).unwrap();
        assert_eq!(out, EXPECTED);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.batches, 1);
        assert_eq!(driver.backend().dispatched, vec![3, 1, 2]);
    }

    #[test]
    fn single_record_batch_is_redispatched_once() {
        let config = PipelineConfig::default().batch_capacity(1);
        let mut driver = PipelineDriver::new(config, FlakyBackend::new(&[false, true])).unwrap();
        let (stats, out) = run(&mut driver).unwrap();
        assert_eq!(out, EXPECTED);
        assert_eq!(stats.retries, 1);
        assert_eq!(driver.backend().dispatched, vec![1, 1, 1, 1]);
    }

    #[test]
    fn second_failure_is_fatal_and_batch_is_not_written() {
        let config = PipelineConfig::default().batch_capacity(2);
        let mut driver =
            PipelineDriver::new(config, FlakyBackend::new(&[false, true, true])).unwrap();
        let mut out = Vec::new();
        let err = driver.run(Cursor::new(INPUT), &mut out).unwrap_err();
        match err {
            PipelineError::BackendExecution { batch, records, .. } => {
                assert_eq!(batch, 2);
                assert_eq!(records, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // first batch was drained before the failure
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written.lines().count(), 2);
    }

    #[test]
    fn retry_disabled_fails_on_first_error() {
        let config = PipelineConfig::default().retry_failed_batches(false);
        let mut driver = PipelineDriver::new(config, FlakyBackend::new(&[true])).unwrap();
        assert!(matches!(
            run(&mut driver),
            Err(PipelineError::BackendExecution { batch: 1, records: 3, .. })
        ));
        assert_eq!(driver.backend().dispatched, vec![3]);
    }

    #[test]
    fn overlap_mode_matches_sequential_output() {
        let config = PipelineConfig::default().batch_capacity(1).overlap(true);
        let mut driver = PipelineDriver::new(config, FlakyBackend::new(&[])).unwrap();
        let (stats, out) = run(&mut driver).unwrap();
        assert_eq!(out, EXPECTED);
        assert_eq!(stats.batches, 3);
    }

    #[test]
    fn observers_see_every_batch_in_order() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let config = PipelineConfig::default().batch_capacity(2);
        let mut driver = PipelineDriver::new(config, FlakyBackend::new(&[]))
            .unwrap()
            .with_observer(Arc::new(move |r: &BatchReport| {
                let prev = counter.fetch_add(r.records, Ordering::SeqCst);
                assert_eq!(r.start, prev as u64);
            }));
        run(&mut driver).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig::default().batch_capacity(0);
        assert!(matches!(
            PipelineDriver::new(config, FlakyBackend::new(&[])),
            Err(PipelineError::Config(_))
        ));
    }

    /// A reader pinned to its thread, like `StdinLock`.
    struct LocalReader {
        inner: Cursor<&'static str>,
        _not_send: PhantomData<Rc<()>>,
    }

    impl Read for LocalReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl BufRead for LocalReader {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt)
        }
    }

    #[test]
    fn sequential_run_accepts_non_send_reader() {
        let mut driver =
            PipelineDriver::new(PipelineConfig::default(), FlakyBackend::new(&[])).unwrap();
        let reader = LocalReader {
            inner: Cursor::new(INPUT),
            _not_send: PhantomData,
        };
        let mut out = Vec::new();
        let stats = driver.run_sequential(reader, &mut out).unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(String::from_utf8(out).unwrap(), EXPECTED);
    }

    /// Serves `data`, then fails every read once it is used up.
    struct BrokenAfter {
        data: Cursor<Vec<u8>>,
    }

    impl BrokenAfter {
        fn exhausted(&self) -> bool {
            self.data.position() as usize >= self.data.get_ref().len()
        }
    }

    impl Read for BrokenAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.exhausted() {
                return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
            }
            self.data.read(buf)
        }
    }

    impl BufRead for BrokenAfter {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.exhausted() {
                return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
            }
            self.data.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.data.consume(amt)
        }
    }

    #[test]
    fn overlap_read_error_keeps_earlier_batches() {
        let config = PipelineConfig::default().batch_capacity(2).overlap(true);
        let mut driver = PipelineDriver::new(config, FlakyBackend::new(&[])).unwrap();
        let reader = BrokenAfter {
            data: Cursor::new(INPUT.as_bytes().to_vec()),
        };
        let mut out = Vec::new();
        let err = driver.run(reader, &mut out).unwrap_err();

        assert!(matches!(err, PipelineError::Stream { .. }), "got {err}");
        assert!(err.to_string().contains("record 3"));
        let written = String::from_utf8(out).unwrap();
        let expected: Vec<&str> = EXPECTED.lines().take(2).collect();
        assert_eq!(written.lines().collect::<Vec<_>>(), expected);
    }
}
