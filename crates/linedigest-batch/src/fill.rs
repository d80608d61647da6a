//! The filling phase: records → `PendingBatch`, plus adaptive packing.

use crate::config::PipelineConfig;
use linedigest_core::{Batch, PendingBatch, PipelineError, RecordReader};
use std::io::BufRead;
use std::ops::Range;
use tracing::warn;

/// Polls a `RecordReader` until a batch is full or the stream ends.
pub struct Filler<R> {
    reader: RecordReader<R>,
    line: Vec<u8>,
    /// `line` holds a record that did not fit the previous batch.
    carried: bool,
    capacity: usize,
    alignment: usize,
    max_bytes: Option<usize>,
}

impl<R: BufRead> Filler<R> {
    pub fn new(reader: RecordReader<R>, config: &PipelineConfig) -> Self {
        Self {
            reader,
            line: Vec::new(),
            carried: false,
            capacity: config.batch_capacity,
            alignment: config.alignment,
            max_bytes: config.max_batch_bytes,
        }
    }

    /// Collect the next batch. `None` means clean end of stream.
    pub fn next_batch(&mut self) -> Result<Option<PendingBatch>, PipelineError> {
        let start = self.reader.records_read() - u64::from(self.carried);
        let mut pending = PendingBatch::new(start);

        while pending.len() < self.capacity {
            if !self.carried && !self.reader.read_record_into(&mut self.line)? {
                break;
            }
            self.carried = false;

            if let Some(max) = self.max_bytes {
                if pending.would_exceed(self.line.len(), self.alignment, max) {
                    self.carried = true;
                    break;
                }
            }
            pending.push(&self.line)?;
        }

        Ok((!pending.is_empty()).then_some(pending))
    }
}

/// Pack `pending` and hand each resulting batch to `emit`, in order.
///
/// With `adaptive` set, an allocation failure splits the records in half
/// and packs each half on its own, down to single records.
pub fn pack_batches<F>(
    pending: &PendingBatch,
    alignment: usize,
    adaptive: bool,
    emit: &mut F,
) -> Result<(), PipelineError>
where
    F: FnMut(Batch) -> Result<(), PipelineError>,
{
    let mut pack = |p: &PendingBatch, range: Range<usize>| p.pack_range(range, alignment);
    pack_batches_with(pending, adaptive, &mut pack, emit)
}

fn pack_batches_with<P, F>(
    pending: &PendingBatch,
    adaptive: bool,
    pack: &mut P,
    emit: &mut F,
) -> Result<(), PipelineError>
where
    P: FnMut(&PendingBatch, Range<usize>) -> Result<Batch, PipelineError>,
    F: FnMut(Batch) -> Result<(), PipelineError>,
{
    pack_range(pending, 0..pending.len(), adaptive, pack, emit)
}

fn pack_range<P, F>(
    pending: &PendingBatch,
    range: Range<usize>,
    adaptive: bool,
    pack: &mut P,
    emit: &mut F,
) -> Result<(), PipelineError>
where
    P: FnMut(&PendingBatch, Range<usize>) -> Result<Batch, PipelineError>,
    F: FnMut(Batch) -> Result<(), PipelineError>,
{
    match pack(pending, range.clone()) {
        Ok(batch) => emit(batch),
        Err(e) if adaptive && e.is_resource_exhausted() && range.len() > 1 => {
            let mid = range.start + range.len() / 2;
            warn!("{e}; halving batch to {} records", mid - range.start);
            pack_range(pending, range.start..mid, adaptive, pack, emit)?;
            pack_range(pending, mid..range.end, adaptive, pack, emit)
        }
        Err(e) => Err(e),
    }
}
