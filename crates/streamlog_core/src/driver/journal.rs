//! Journal of committed batch imports.
//!
//! Each import appends one fixed-size entry before the HEAD publish:
//!
//! ```text
//! | batch id (16) | start (8) | end (8) | crc32 (4) |
//! ```
//!
//! An entry only counts if HEAD covers its range. Entries past the
//! committed tail belong to an import whose publish never happened and are
//! cut off on open.

use crate::batch::BatchId;
use crate::offset::OffsetRange;
use std::collections::HashMap;
use std::sync::Arc;
use streamlog_storage::{StorageBackend, StorageResult};

const ENTRY_SIZE: usize = 16 + 8 + 8 + 4;

/// Durable map from batch to the range its import committed at.
pub struct ImportJournal {
    backend: Arc<dyn StorageBackend>,
    entries: HashMap<BatchId, OffsetRange>,
    size: u64,
}

impl ImportJournal {
    /// Loads the journal, dropping entries beyond `committed_tail`.
    ///
    /// Returns the journal and the number of entries dropped.
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        committed_tail: u64,
    ) -> StorageResult<(Self, usize)> {
        let total = backend.size()?;
        let data = backend.read_at(0, total as usize)?;

        let mut entries = HashMap::new();
        let mut valid = 0usize;
        for chunk in data.chunks(ENTRY_SIZE) {
            let Some((batch, range)) = decode_entry(chunk) else {
                break;
            };
            if range.end.as_u64() > committed_tail {
                break;
            }
            entries.insert(batch, range);
            valid += ENTRY_SIZE;
        }

        let dropped = (data.len() - valid).div_ceil(ENTRY_SIZE);
        if valid < data.len() {
            backend.truncate(valid as u64)?;
            backend.sync()?;
        }

        Ok((
            Self {
                backend,
                entries,
                size: valid as u64,
            },
            dropped,
        ))
    }

    /// Returns the committed range of a batch, if it was imported.
    #[must_use]
    pub fn get(&self, batch: BatchId) -> Option<OffsetRange> {
        self.entries.get(&batch).copied()
    }

    /// Returns the number of committed imports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the durable journal size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Writes an entry without making it visible to [`Self::get`].
    pub fn append(&self, batch: BatchId, range: OffsetRange, sync: bool) -> StorageResult<()> {
        self.backend.append(&encode_entry(batch, range))?;
        if sync {
            self.backend.sync()?;
        }
        Ok(())
    }

    /// Makes an appended entry visible once its commit is published.
    pub fn record(&mut self, batch: BatchId, range: OffsetRange) {
        self.entries.insert(batch, range);
        self.size += ENTRY_SIZE as u64;
    }

    /// Cuts off anything appended since the last recorded entry.
    pub fn rollback(&self) -> StorageResult<()> {
        self.backend.truncate(self.size)
    }
}

fn encode_entry(batch: BatchId, range: OffsetRange) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENTRY_SIZE);
    buf.extend_from_slice(batch.as_bytes());
    buf.extend_from_slice(&range.start.as_u64().to_le_bytes());
    buf.extend_from_slice(&range.end.as_u64().to_le_bytes());
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

fn decode_entry(chunk: &[u8]) -> Option<(BatchId, OffsetRange)> {
    if chunk.len() != ENTRY_SIZE {
        return None;
    }
    let (body, crc) = chunk.split_at(ENTRY_SIZE - 4);
    if crc32fast::hash(body) != u32::from_le_bytes(crc.try_into().ok()?) {
        return None;
    }
    let batch = BatchId::from_bytes(body[0..16].try_into().ok()?);
    let start = u64::from_le_bytes(body[16..24].try_into().ok()?);
    let end = u64::from_le_bytes(body[24..32].try_into().ok()?);
    Some((batch, OffsetRange::new(start, end)))
}
