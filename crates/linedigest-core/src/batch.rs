//! Batch packing: variable-length records → one fixed-stride buffer.
//!
//! Every record in a batch gets a slot of `stride` bytes, where `stride`
//! is the longest record rounded up to the backend block alignment. Bytes
//! past a record's true length are zero. The packed buffer holds record
//! bytes verbatim; backends read it as big-endian 32-bit words.

use crate::error::PipelineError;
use std::ops::Range;

/// Block alignment of both supported digest algorithms, in bytes.
pub const BLOCK_ALIGNMENT: usize = 64;

/// Slot size for a batch whose longest record is `max_len` bytes.
///
/// Always a positive multiple of `alignment`, so an all-empty batch still
/// gets one alignment unit per record.
pub fn stride_for(max_len: usize, alignment: usize) -> usize {
    max_len.max(1).div_ceil(alignment) * alignment
}

/// Reject alignments that are not whole digest blocks. Larger multiples
/// (128, 256, ...) are allowed for kernels that want wider slots.
pub fn check_alignment(alignment: usize) -> Result<(), PipelineError> {
    if alignment == 0 || alignment % BLOCK_ALIGNMENT != 0 {
        return Err(PipelineError::Config(format!(
            "alignment must be a positive multiple of {BLOCK_ALIGNMENT}, got {alignment}"
        )));
    }
    Ok(())
}

/// Records collected during the filling phase, not yet packed.
///
/// Record bytes live back to back in one arena so filling does not
/// allocate per record.
#[derive(Debug, Default)]
pub struct PendingBatch {
    start: u64,
    data: Vec<u8>,
    offsets: Vec<usize>,
    lengths: Vec<u32>,
    max_len: usize,
}

impl PendingBatch {
    /// Start an empty batch whose first record has global index `start`.
    pub fn new(start: u64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn push(&mut self, record: &[u8]) -> Result<(), PipelineError> {
        if u32::try_from(record.len()).is_err() {
            return Err(PipelineError::RecordTooLarge {
                index: self.start + self.lengths.len() as u64,
                len: record.len(),
            });
        }
        self.offsets.push(self.data.len());
        self.lengths.push(record.len() as u32);
        self.data.extend_from_slice(record);
        self.max_len = self.max_len.max(record.len());
        Ok(())
    }

    /// Whether adding a record of `next_len` bytes would push the packed
    /// size past `max_bytes`. An empty batch always accepts one record.
    pub fn would_exceed(&self, next_len: usize, alignment: usize, max_bytes: usize) -> bool {
        if self.is_empty() {
            return false;
        }
        let stride = stride_for(self.max_len.max(next_len), alignment);
        match stride.checked_mul(self.len() + 1) {
            Some(total) => total > max_bytes,
            None => true,
        }
    }

    /// Pack every pending record.
    pub fn pack(&self, alignment: usize) -> Result<Batch, PipelineError> {
        self.pack_range(0..self.len(), alignment)
    }

    /// Pack the records in `range` (local indices) into their own batch,
    /// with a stride computed from that range alone.
    pub fn pack_range(
        &self,
        range: Range<usize>,
        alignment: usize,
    ) -> Result<Batch, PipelineError> {
        let count = range.len();
        let lengths = &self.lengths[range.clone()];
        let max_len = lengths.iter().copied().max().unwrap_or(0) as usize;
        let stride = stride_for(max_len, alignment);

        let total = count
            .checked_mul(stride)
            .ok_or(PipelineError::ResourceExhausted {
                bytes: usize::MAX,
                records: count,
            })?;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(total)
            .map_err(|_| PipelineError::ResourceExhausted {
                bytes: total,
                records: count,
            })?;
        buffer.resize(total, 0);

        for (slot, idx) in range.clone().enumerate() {
            let len = self.lengths[idx] as usize;
            let src = &self.data[self.offsets[idx]..self.offsets[idx] + len];
            let dst = slot * stride;
            buffer[dst..dst + len].copy_from_slice(src);
        }

        Ok(Batch {
            start: self.start + range.start as u64,
            buffer,
            lengths: lengths.to_vec(),
            stride,
        })
    }
}

/// A packed batch ready for one backend dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    start: u64,
    buffer: Vec<u8>,
    lengths: Vec<u32>,
    stride: usize,
}

impl Batch {
    /// Global index of the first record in this batch.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Bytes reserved per record slot.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Stride in 32-bit words, as passed to word-oriented kernels.
    pub fn stride_words(&self) -> u32 {
        (self.stride / 4) as u32
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn max_len(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0) as usize
    }

    /// Total size of the packed buffer.
    pub fn size_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// The full padded slot of record `i`.
    pub fn slot(&self, i: usize) -> &[u8] {
        &self.buffer[i * self.stride..(i + 1) * self.stride]
    }

    /// The true bytes of record `i`, without padding.
    pub fn record(&self, i: usize) -> &[u8] {
        &self.buffer[i * self.stride..i * self.stride + self.lengths[i] as usize]
    }

    /// Split into `[0, mid)` and `[mid, len)`. Both halves keep the stride.
    pub fn split_at(mut self, mid: usize) -> (Batch, Batch) {
        let tail_buffer = self.buffer.split_off(mid * self.stride);
        let tail_lengths = self.lengths.split_off(mid);
        let tail = Batch {
            start: self.start + mid as u64,
            buffer: tail_buffer,
            lengths: tail_lengths,
            stride: self.stride,
        };
        (self, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(records: &[&[u8]]) -> PendingBatch {
        let mut p = PendingBatch::new(0);
        for r in records {
            p.push(r).unwrap();
        }
        p
    }

    fn assert_zero_padded(batch: &Batch) {
        for i in 0..batch.len() {
            let len = batch.lengths()[i] as usize;
            assert!(
                batch.slot(i)[len..].iter().all(|&b| b == 0),
                "slot {i} has non-zero padding"
            );
        }
    }

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(stride_for(0, 64), 64);
        assert_eq!(stride_for(1, 64), 64);
        assert_eq!(stride_for(63, 64), 64);
        assert_eq!(stride_for(64, 64), 64);
        assert_eq!(stride_for(65, 64), 128);
        assert_eq!(stride_for(1000, 64), 1024);
    }

    #[test]
    fn packs_records_verbatim_with_zero_padding() {
        let batch = pending(&[b"abc", b"", b"hello"]).pack(BLOCK_ALIGNMENT).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.stride(), 64);
        assert_eq!(batch.size_bytes(), 3 * 64);
        assert_eq!(batch.lengths(), &[3, 0, 5]);
        assert_eq!(batch.record(0), b"abc");
        assert_eq!(batch.record(1), b"");
        assert_eq!(batch.record(2), b"hello");
        assert_zero_padded(&batch);
    }

    #[test]
    fn all_empty_batch_keeps_one_alignment_unit() {
        let batch = pending(&[b"", b""]).pack(BLOCK_ALIGNMENT).unwrap();
        assert_eq!(batch.stride(), 64);
        assert_eq!(batch.size_bytes(), 128);
        assert!(batch.buffer().iter().all(|&b| b == 0));
    }

    #[test]
    fn record_one_short_of_stride_gets_single_padding_byte() {
        let rec = vec![0xAAu8; 63];
        let batch = pending(&[&rec]).pack(BLOCK_ALIGNMENT).unwrap();
        assert_eq!(batch.stride(), 64);
        assert_eq!(batch.slot(0)[..63], rec[..]);
        assert_eq!(batch.slot(0)[63], 0);
    }

    #[test]
    fn long_record_grows_stride_for_whole_batch() {
        let long = vec![b'x'; 200];
        let batch = pending(&[b"a", &long, b"b"]).pack(BLOCK_ALIGNMENT).unwrap();
        assert_eq!(batch.stride(), 256);
        assert_eq!(batch.max_len(), 200);
        assert_eq!(batch.stride_words(), 64);
        assert_eq!(batch.record(1), &long[..]);
        assert_zero_padded(&batch);
    }

    #[test]
    fn pack_range_uses_its_own_stride_and_start() {
        let long = vec![b'x'; 300];
        let mut p = PendingBatch::new(10);
        for r in [&b"a"[..], &long[..], &b"bb"[..], &b"ccc"[..]] {
            p.push(r).unwrap();
        }
        let tail = p.pack_range(2..4, BLOCK_ALIGNMENT).unwrap();
        assert_eq!(tail.start(), 12);
        assert_eq!(tail.stride(), 64);
        assert_eq!(tail.record(0), b"bb");
        assert_eq!(tail.record(1), b"ccc");
    }

    #[test]
    fn split_keeps_stride_and_offsets() {
        let batch = pending(&[b"one", b"two", b"three"]).pack(BLOCK_ALIGNMENT).unwrap();
        let (head, tail) = batch.split_at(1);
        assert_eq!(head.len(), 1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.start(), 1);
        assert_eq!(tail.stride(), 64);
        assert_eq!(head.record(0), b"one");
        assert_eq!(tail.record(1), b"three");
    }

    #[test]
    fn byte_budget_closes_batch_early() {
        let p = pending(&[b"abc"]);
        // two 64-byte slots fit in 128 bytes, a 65-byte record needs two 128-byte slots
        assert!(!p.would_exceed(10, 64, 128));
        assert!(p.would_exceed(65, 64, 128));
        assert!(!PendingBatch::new(0).would_exceed(1 << 20, 64, 128));
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(check_alignment(64).is_ok());
        assert!(check_alignment(128).is_ok());
        assert!(check_alignment(0).is_err());
        assert!(check_alignment(4).is_err());
        assert!(check_alignment(6).is_err());
        assert!(check_alignment(32).is_err());
        assert!(check_alignment(96).is_err());
    }
}
