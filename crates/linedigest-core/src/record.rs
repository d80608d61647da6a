//! Pulls newline-delimited records from a stream.
//!
//! Only one record (plus whatever the underlying `BufRead` has buffered)
//! is held at a time, so input size never bounds memory.

use crate::error::PipelineError;
use std::io::BufRead;

const DELIMITER: u8 = b'\n';

/// Streaming reader yielding one record per input line.
///
/// The trailing `\n` is stripped; any `\r` before it is kept as record
/// content. A final line without a delimiter is still a record.
pub struct RecordReader<R> {
    inner: R,
    index: u64,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            index: 0,
            done: false,
        }
    }

    /// Number of records returned so far, i.e. the index of the next one.
    pub fn records_read(&self) -> u64 {
        self.index
    }

    /// Read the next record into `buf`, replacing its contents.
    /// Returns `false` once the stream is exhausted.
    pub fn read_record_into(&mut self, buf: &mut Vec<u8>) -> Result<bool, PipelineError> {
        buf.clear();
        if self.done {
            return Ok(false);
        }

        let n = self
            .inner
            .read_until(DELIMITER, buf)
            .map_err(|e| PipelineError::read(self.index, e))?;

        if n == 0 {
            self.done = true;
            return Ok(false);
        }

        if buf.last() == Some(&DELIMITER) {
            buf.pop();
        }
        self.index += 1;
        Ok(true)
    }

    /// Read the next record as an owned buffer.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, PipelineError> {
        let mut buf = Vec::new();
        if self.read_record_into(&mut buf)? {
            Ok(Some(buf))
        } else {
            Ok(None)
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn collect(input: &[u8]) -> Vec<Vec<u8>> {
        RecordReader::new(Cursor::new(input.to_vec()))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn splits_on_newline_and_strips_delimiter() {
        let records = collect(b"abc\nhello\n");
        assert_eq!(records, vec![b"abc".to_vec(), b"hello".to_vec()]);
    }

    #[test]
    fn keeps_empty_records_between_delimiters() {
        let records = collect(b"abc\n\n\nhello\n");
        assert_eq!(records.len(), 4);
        assert!(records[1].is_empty());
        assert!(records[2].is_empty());
    }

    #[test]
    fn final_record_without_delimiter() {
        let records = collect(b"abc\nlast");
        assert_eq!(records, vec![b"abc".to_vec(), b"last".to_vec()]);
    }

    #[test]
    fn empty_stream_has_no_records() {
        assert!(collect(b"").is_empty());
    }

    #[test]
    fn single_newline_is_one_empty_record() {
        assert_eq!(collect(b"\n"), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn carriage_return_is_content() {
        assert_eq!(collect(b"abc\r\n"), vec![b"abc\r".to_vec()]);
    }

    #[test]
    fn counts_records_and_reuses_buffer() {
        let mut reader = RecordReader::new(Cursor::new(b"a\nbb\nccc".to_vec()));
        let mut buf = Vec::new();
        let mut lens = Vec::new();
        while reader.read_record_into(&mut buf).unwrap() {
            lens.push(buf.len());
        }
        assert_eq!(lens, vec![1, 2, 3]);
        assert_eq!(reader.records_read(), 3);
        assert!(!reader.read_record_into(&mut buf).unwrap());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn io_failure_surfaces_as_stream_error() {
        let mut reader = RecordReader::new(io::BufReader::new(FailingReader));
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Stream { .. }));
        assert!(err.to_string().contains("record 0"));
        assert!(reader.next().is_none());
    }
}
