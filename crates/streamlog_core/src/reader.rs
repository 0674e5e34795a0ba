//! Resumable iteration over committed records.

use crate::driver::LogDriver;
use crate::error::LogResult;
use crate::offset::StorageOffset;
use crate::record::RetrievedRecord;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Iterator over committed records in offset order.
///
/// The reader fetches pages lazily. On the first pull it snapshots the
/// committed tail and never reads past it, so records committed while the
/// iteration runs are left for the next reader. After an error it yields
/// nothing more; resume with a new reader from [`RecordReader::position`].
pub struct RecordReader {
    driver: Arc<dyn LogDriver>,
    position: StorageOffset,
    until: Option<StorageOffset>,
    remaining: Option<usize>,
    page_size: usize,
    buffer: VecDeque<RetrievedRecord>,
    done: bool,
}

impl RecordReader {
    /// Creates a reader starting at `start`.
    pub(crate) fn new(
        driver: Arc<dyn LogDriver>,
        start: StorageOffset,
        max_record_count: Option<usize>,
        page_size: usize,
    ) -> Self {
        Self {
            driver,
            position: start,
            until: None,
            remaining: max_record_count,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Returns the resume cursor: the offset just past the last record
    /// yielded, or the start offset if nothing was yielded yet.
    #[must_use]
    pub fn position(&self) -> StorageOffset {
        self.position
    }

    /// Returns the tail snapshot bounding this reader, once taken.
    #[must_use]
    pub fn snapshot_tail(&self) -> Option<StorageOffset> {
        self.until
    }

    fn fetch(&mut self) -> LogResult<bool> {
        let until = match self.until {
            Some(until) => until,
            None => {
                let tail = self.driver.tail()?;
                self.until = Some(tail);
                tail
            }
        };
        if self.position >= until {
            return Ok(false);
        }

        let want = self.remaining.map_or(self.page_size, |r| r.min(self.page_size));
        let page = self.driver.read_page(self.position, until, want)?;
        let fetched = !page.is_empty();
        self.buffer.extend(page);
        Ok(fetched)
    }
}

impl Iterator for RecordReader {
    type Item = LogResult<RetrievedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        if self.buffer.is_empty() {
            match self.fetch() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let record = self.buffer.pop_front()?;
        self.position = record.next_offset;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(record))
    }
}

impl FusedIterator for RecordReader {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::BlobLogDriver;
    use crate::error::ErrorKind;
    use streamlog_storage::InMemoryBlobStore;

    fn driver_with(count: u32) -> Arc<dyn LogDriver> {
        let driver = BlobLogDriver::open(Arc::new(InMemoryBlobStore::new()), "log", Config::default())
            .unwrap();
        for i in 0..count {
            driver.append("s", &i.to_le_bytes()).unwrap();
        }
        Arc::new(driver)
    }

    fn payloads(reader: RecordReader) -> Vec<u32> {
        reader
            .map(|r| u32::from_le_bytes(r.unwrap().payload.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn pages_through_everything() {
        let driver = driver_with(25);
        let reader = RecordReader::new(driver, StorageOffset::ZERO, None, 4);
        assert_eq!(payloads(reader), (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn max_count_bounds_iteration() {
        let driver = driver_with(10);
        let mut reader = RecordReader::new(driver.clone(), StorageOffset::ZERO, Some(3), 2);
        let first: Vec<_> = reader.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(reader.position(), first[2].next_offset);

        let rest = RecordReader::new(driver, reader.position(), None, 2);
        assert_eq!(payloads(rest), (3..10).collect::<Vec<_>>());
    }

    #[test]
    fn snapshot_excludes_later_commits() {
        let driver = driver_with(3);
        let mut reader = RecordReader::new(driver.clone(), StorageOffset::ZERO, None, 1);
        assert!(reader.next().is_some());
        let snapshot = reader.snapshot_tail().unwrap();

        driver.append("s", &99u32.to_le_bytes()).unwrap();
        assert_eq!(reader.by_ref().count(), 2);
        assert_eq!(reader.position(), snapshot);
    }

    #[test]
    fn start_at_tail_yields_nothing() {
        let driver = driver_with(2);
        let tail = driver.tail().unwrap();
        let mut reader = RecordReader::new(driver, tail, None, 10);
        assert!(reader.next().is_none());
        assert_eq!(reader.position(), tail);
    }

    #[test]
    fn zero_max_count_reads_nothing() {
        let driver = driver_with(2);
        let mut reader = RecordReader::new(driver, StorageOffset::ZERO, Some(0), 10);
        assert!(reader.next().is_none());
        assert!(reader.snapshot_tail().is_none());
    }

    #[test]
    fn damaged_record_ends_scan_after_intact_ones() {
        use crate::driver::FileLogDriver;
        use crate::record::frame_len;
        use std::io::{Seek, SeekFrom, Write};

        let temp = tempfile::tempdir().unwrap();
        let driver = FileLogDriver::open(temp.path(), Config::default()).unwrap();
        for i in 0..5u32 {
            driver.append("s", &i.to_le_bytes()).unwrap();
        }

        // Flip the first payload byte of record 2.
        let frame = frame_len(1, 4);
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(temp.path().join("stream.dat"))
            .unwrap();
        file.seek(SeekFrom::Start(2 * frame + 13)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let mut reader = RecordReader::new(Arc::new(driver), StorageOffset::ZERO, None, 10);
        let intact: Vec<_> = reader.by_ref().map_while(Result::ok).collect();
        assert_eq!(intact.len(), 2);
        assert_eq!(intact[1].payload, 1u32.to_le_bytes());
        assert_eq!(reader.position(), StorageOffset::from_bytes(2 * frame));
        assert!(reader.next().is_none());
    }

    #[test]
    fn error_fuses_reader() {
        struct Broken;
        impl LogDriver for Broken {
            fn append(&self, _: &str, _: &[u8]) -> LogResult<crate::OffsetRange> {
                unreachable!()
            }
            fn stage(&self, _: crate::BatchId, _: u32, _: &[u8]) -> LogResult<()> {
                unreachable!()
            }
            fn seal(&self, _: &crate::BatchManifest) -> LogResult<()> {
                unreachable!()
            }
            fn import(&self, _: crate::BatchId) -> LogResult<crate::ImportOutcome> {
                unreachable!()
            }
            fn discard(&self, _: crate::BatchId) -> LogResult<()> {
                unreachable!()
            }
            fn read_page(
                &self,
                _: StorageOffset,
                _: StorageOffset,
                _: usize,
            ) -> LogResult<Vec<RetrievedRecord>> {
                Err(crate::LogError::corrupted("bad frame"))
            }
            fn tail(&self) -> LogResult<StorageOffset> {
                Ok(StorageOffset::from_bytes(100))
            }
            fn describe(&self) -> crate::DriverInfo {
                unreachable!()
            }
        }

        let mut reader = RecordReader::new(Arc::new(Broken), StorageOffset::ZERO, None, 10);
        assert_eq!(reader.next().unwrap().unwrap_err().kind(), ErrorKind::Corrupted);
        assert!(reader.next().is_none());
        assert_eq!(reader.position(), StorageOffset::ZERO);
    }
}
