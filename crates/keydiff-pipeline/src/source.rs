//! Record sources.
//!
//! The pipeline does not care where reviews are stored. A [`RecordSource`]
//! yields raw records one at a time until the end of the stream; the pipeline
//! reads it in batches of [`ScanConfig::batch_size`] records, and every batch
//! becomes one map partition.
//!
//! Batches are read on demand while the map workers run, so only a few
//! unmapped batches are held at a time. The mapped key/value pairs of the
//! whole stage are still kept in memory until the reduce phase, and the
//! intermediate datasets between stages are read in full.

use std::{io, num::NonZeroUsize};

use crate::record::RawRecord;

/// Sequential access to raw review records.
pub trait RecordSource {
    /// Returns the next record, or `None` at the end of the stream.
    fn next_record(&mut self) -> io::Result<Option<RawRecord>>;
}

impl<S> RecordSource for &mut S
where
    S: RecordSource + ?Sized,
{
    fn next_record(&mut self) -> io::Result<Option<RawRecord>> {
        (**self).next_record()
    }
}

/// How a record source is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of records fetched per batch; each batch is one map partition.
    pub batch_size: NonZeroUsize,
}

impl ScanConfig {
    pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(500).unwrap();
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Splits `source` into partitions of at most `scan.batch_size` records.
///
/// Records are read lazily, one batch per call to [`Iterator::next`]. The
/// iterator ends after the first read error.
pub fn batches<S>(source: S, scan: &ScanConfig) -> Batches<S>
where
    S: RecordSource,
{
    Batches {
        source,
        batch_size: scan.batch_size,
        done: false,
    }
}

/// Iterator returned by [`batches`].
#[derive(Debug)]
pub struct Batches<S> {
    source: S,
    batch_size: NonZeroUsize,
    done: bool,
}

impl<S> Iterator for Batches<S>
where
    S: RecordSource,
{
    type Item = io::Result<Vec<RawRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.batch_size.get());
        while batch.len() < self.batch_size.get() {
            match self.source.next_record() {
                Ok(Some(record)) => batch.push(record),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        (!batch.is_empty()).then_some(Ok(batch))
    }
}

/// A source reading one JSON payload per line.
///
/// Blank lines are skipped. The row key of each record is its 1-based line
/// number. Invalid UTF-8 is replaced with U+FFFD, so a badly encoded line
/// still becomes a record and only fails if its payload does not parse.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    line_number: usize,
}

impl<R> JsonLinesSource<R>
where
    R: io::BufRead,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
        }
    }
}

impl<R> RecordSource for JsonLinesSource<R>
where
    R: io::BufRead,
{
    fn next_record(&mut self) -> io::Result<Option<RawRecord>> {
        loop {
            let mut bytes = vec![];
            if self.reader.read_until(b'\n', &mut bytes)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = String::from_utf8_lossy(&bytes);
            let payload = line.trim_end_matches(['\n', '\r']);
            if payload.trim().is_empty() {
                continue;
            }
            return Ok(Some(RawRecord::new(
                self.line_number.to_string(),
                payload,
            )));
        }
    }
}

/// A source over records already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    records: std::vec::IntoIter<RawRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }

    /// Wraps JSON payloads, numbering their row keys from 1.
    pub fn from_payloads<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| RawRecord::new((i + 1).to_string(), payload))
            .collect();
        Self::new(records)
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> io::Result<Option<RawRecord>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(batch_size: usize) -> ScanConfig {
        ScanConfig {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
        }
    }

    #[test]
    fn test_json_lines_source() {
        let input = "{\"a\":1}\r\n\n   \n{\"b\":2}\n{\"c\":3}";
        let mut source = JsonLinesSource::new(input.as_bytes());
        let mut records = vec![];
        while let Some(record) = source.next_record().unwrap() {
            records.push(record);
        }
        assert_eq!(
            records,
            [
                RawRecord::new("1", "{\"a\":1}"),
                RawRecord::new("4", "{\"b\":2}"),
                RawRecord::new("5", "{\"c\":3}"),
            ]
        );
    }

    #[test]
    fn test_partitions_respect_batch_size() {
        let source = MemorySource::from_payloads(["a", "b", "c", "d", "e"]);
        let partitions = batches(source, &scan(2))
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        let sizes = partitions.iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, [2, 2, 1]);
        assert_eq!(partitions[2][0].row_key, "5");
    }

    #[test]
    fn test_empty_source_has_no_partitions() {
        let source = MemorySource::new(vec![]);
        assert!(batches(source, &scan(3)).next().is_none());
    }

    #[test]
    fn test_read_error_is_propagated() {
        struct Failing;
        impl RecordSource for Failing {
            fn next_record(&mut self) -> io::Result<Option<RawRecord>> {
                Err(io::Error::other("scanner timed out"))
            }
        }
        let mut batches = batches(Failing, &ScanConfig::default());
        let err = batches.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "scanner timed out");
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_line_is_decoded_lossily() {
        let input = b"{\"a\":1}\n{\"b\":\"caf\xe9\"}\n{\"c\":3}\n";
        let mut source = JsonLinesSource::new(&input[..]);
        let mut records = vec![];
        while let Some(record) = source.next_record().unwrap() {
            records.push(record);
        }
        assert_eq!(
            records,
            [
                RawRecord::new("1", "{\"a\":1}"),
                RawRecord::new("2", "{\"b\":\"caf\u{fffd}\"}"),
                RawRecord::new("3", "{\"c\":3}"),
            ]
        );
    }

    #[test]
    fn test_batches_are_read_lazily() {
        let mut source = MemorySource::from_payloads(["a", "b", "c"]);
        let first = batches(&mut source, &scan(2)).next().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(source.next_record().unwrap().unwrap().row_key, "3");
    }

    #[test]
    fn test_default_batch_size() {
        assert_eq!(ScanConfig::default().batch_size.get(), 500);
    }
}
