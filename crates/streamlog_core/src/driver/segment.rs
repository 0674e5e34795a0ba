//! Blob-log metadata: the head pointer, segment descriptors and the
//! descriptor chain cache.
//!
//! Layout under `<container>/`:
//!
//! ```text
//! head                          HeadPointer (replaced by compare-and-swap)
//! segments/<seq>-<uuid>         SegmentDescriptor, immutable
//! chunks/<uuid>                 Framed bytes of one appended record
//! staging/<batch>/<index>       Raw staged payload
//! staging/<batch>/sealed        BatchManifest
//! ```
//!
//! Every commit writes one descriptor whose `prev` names the descriptor
//! the head pointed to before. Walking `prev` links from the head yields
//! the whole log in reverse commit order.

use crate::batch::{BatchId, StagedEntry};
use crate::error::{LogError, LogResult};
use crate::offset::OffsetRange;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Blob names of one log container.
#[derive(Debug, Clone)]
pub struct BlobLayout {
    container: String,
}

impl BlobLayout {
    /// Creates the layout of `container`.
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
        }
    }

    /// Returns the container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Name of the head pointer.
    pub fn head(&self) -> String {
        format!("{}/head", self.container)
    }

    /// Name of a new descriptor with sequence number `seq`.
    pub fn new_segment(&self, seq: u64) -> String {
        format!(
            "{}/segments/{seq:020}-{}",
            self.container,
            Uuid::new_v4().as_simple()
        )
    }

    /// Name of a new chunk.
    pub fn new_chunk(&self) -> String {
        format!("{}/chunks/{}", self.container, Uuid::new_v4().as_simple())
    }

    /// Prefix of every blob staged for `batch`.
    pub fn staging_prefix(&self, batch: BatchId) -> String {
        format!("{}/staging/{batch}/", self.container)
    }

    /// Name of the payload staged at `index`.
    pub fn staged(&self, batch: BatchId, index: u32) -> String {
        format!("{}{index:08}", self.staging_prefix(batch))
    }

    /// Name of the manifest of `batch`.
    pub fn sealed(&self, batch: BatchId) -> String {
        format!("{}sealed", self.staging_prefix(batch))
    }
}

/// The commit pointer of a blob log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadPointer {
    /// Sequence number of the latest commit; 0 for an empty log.
    pub seq: u64,
    /// Offset just past the last committed record.
    pub tail: u64,
    /// Descriptor of the latest commit.
    pub latest: Option<String>,
}

/// Where the records of one commit live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentBody {
    /// A chunk of framed records uploaded by `append`.
    Inline {
        /// Chunk blob name.
        chunk: String,
        /// Number of frames in the chunk.
        records: u32,
    },
    /// A batch whose staged payloads are referenced in place.
    Imported {
        /// The imported batch.
        batch: BatchId,
        /// Stream tag of every record.
        stream: String,
        /// Staged payloads, in commit order.
        entries: Vec<StagedEntry>,
    },
}

/// One immutable commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Commit sequence number, starting at 1.
    pub seq: u64,
    /// First offset of the commit.
    pub start: u64,
    /// Offset just past the commit.
    pub end: u64,
    /// Descriptor of the previous commit.
    pub prev: Option<String>,
    /// Location of the records.
    pub body: SegmentBody,
}

impl SegmentDescriptor {
    /// Returns the range the commit occupies.
    pub fn range(&self) -> OffsetRange {
        OffsetRange::new(self.start, self.end)
    }

    /// Returns the number of records in the commit.
    pub fn record_count(&self) -> usize {
        match &self.body {
            SegmentBody::Inline { records, .. } => *records as usize,
            SegmentBody::Imported { entries, .. } => entries.len(),
        }
    }
}

/// Serializes a metadata value as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> LogResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)
        .map_err(|e| LogError::corrupted(format!("failed to encode log metadata: {e}")))?;
    Ok(out)
}

/// Deserializes a metadata value from CBOR.
pub fn from_cbor<T: DeserializeOwned>(data: &[u8], name: &str) -> LogResult<T> {
    ciborium::from_reader(data).map_err(|e| LogError::corrupted(format!("invalid blob {name}: {e}")))
}

/// In-process copy of the descriptor chain.
///
/// Descriptors are immutable once the head references them, so the cache
/// only ever grows: a sync fetches the descriptors committed since the last
/// one it knows.
#[derive(Debug, Default)]
pub struct ChainCache {
    by_start: BTreeMap<u64, Arc<SegmentDescriptor>>,
    batches: HashMap<BatchId, OffsetRange>,
    names: HashMap<u64, String>,
    latest_seq: u64,
    latest_name: Option<String>,
    tail: u64,
}

impl ChainCache {
    /// Returns the sequence number of the newest cached commit.
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    /// Returns the tail covered by the cache.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Returns the range a batch was committed at, if it was.
    pub fn batch(&self, batch: BatchId) -> Option<OffsetRange> {
        self.batches.get(&batch).copied()
    }

    /// Returns the descriptor name committed at `seq`, if cached.
    pub fn name_at(&self, seq: u64) -> Option<&str> {
        self.names.get(&seq).map(String::as_str)
    }

    /// Returns the number of imported batches.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Returns true if the cache already covers `head`.
    pub fn covers(&self, head: &HeadPointer) -> bool {
        head.seq <= self.latest_seq
    }

    /// Returns the commits overlapping `[from, until)`, in offset order.
    pub fn segments(&self, from: u64, until: u64) -> Vec<Arc<SegmentDescriptor>> {
        if from >= until {
            return Vec::new();
        }
        let first = self
            .by_start
            .range(..=from)
            .next_back()
            .map_or(from, |(&start, _)| start);
        self.by_start
            .range(first..until)
            .filter(|(_, segment)| segment.end > from)
            .map(|(_, segment)| Arc::clone(segment))
            .collect()
    }

    /// Extends the cache with descriptors fetched newest first.
    ///
    /// `fetched[0]` must be the descriptor `head` points to. The walk must
    /// reach back to the commit after the newest cached one; anything older
    /// is ignored.
    pub fn extend(
        &mut self,
        head: &HeadPointer,
        fetched: Vec<(String, SegmentDescriptor)>,
    ) -> LogResult<()> {
        if self.covers(head) {
            return Ok(());
        }

        let mut expected_seq = head.seq;
        let mut expected_end = head.tail;
        let mut expected_name = head.latest.clone();
        let mut fresh = 0;
        for (name, descriptor) in &fetched {
            if expected_seq == self.latest_seq {
                break;
            }
            if Some(name) != expected_name.as_ref()
                || descriptor.seq != expected_seq
                || descriptor.end != expected_end
                || descriptor.start > descriptor.end
            {
                return Err(LogError::corrupted(format!(
                    "descriptor chain broken at {name}: seq {} [{}..{}), expected seq {expected_seq} ending at {expected_end}",
                    descriptor.seq, descriptor.start, descriptor.end
                )));
            }
            expected_seq = expected_seq.saturating_sub(1);
            expected_end = descriptor.start;
            expected_name = descriptor.prev.clone();
            fresh += 1;
        }

        if expected_seq != self.latest_seq
            || expected_end != self.tail
            || expected_name != self.latest_name
        {
            return Err(LogError::corrupted(format!(
                "descriptor chain does not reconnect with commit {} ending at {}",
                self.latest_seq, self.tail
            )));
        }

        for (name, descriptor) in fetched.into_iter().take(fresh).rev() {
            self.insert(name, descriptor);
        }
        Ok(())
    }

    /// Appends the commit that directly follows the newest cached one.
    ///
    /// Anything else is ignored; a later sync picks it up.
    pub fn insert(&mut self, name: String, descriptor: SegmentDescriptor) {
        if descriptor.seq != self.latest_seq + 1 || descriptor.start != self.tail {
            return;
        }
        if let SegmentBody::Imported { batch, .. } = &descriptor.body {
            self.batches.insert(*batch, descriptor.range());
        }
        self.latest_seq = descriptor.seq;
        self.names.insert(descriptor.seq, name.clone());
        self.latest_name = Some(name);
        self.tail = descriptor.end;
        if descriptor.end > descriptor.start {
            self.by_start.insert(descriptor.start, Arc::new(descriptor));
        }
    }
}
