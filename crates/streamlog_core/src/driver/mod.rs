//! Backend storage drivers.
//!
//! A driver owns the physical layout of one log and is the only component
//! that assigns offsets. Two drivers are provided:
//!
//! - [`FileLogDriver`] - a single framed data file in a local directory
//! - [`BlobLogDriver`] - a chain of immutable segment descriptors in a
//!   cloud-style object store, published through a compare-and-swap head
//!
//! Both expose the same [`LogDriver`] capability, so the staging pipeline,
//! the reader and the client never branch on the backend.

mod blob;
mod dir;
mod file;
mod head;
mod index;
mod journal;
mod segment;

pub use blob::BlobLogDriver;
pub use file::FileLogDriver;

use crate::batch::{BatchId, BatchManifest, ImportOutcome};
use crate::error::LogResult;
use crate::offset::{OffsetRange, StorageOffset};
use crate::record::RetrievedRecord;
use std::fmt;

/// The capability every storage backend provides.
///
/// # Invariants
///
/// - Offsets are assigned here and nowhere else; they strictly increase in
///   commit order and are never reused
/// - Every record of an imported batch becomes visible at the same instant
/// - Once `append` or `import` returns, `tail` reflects the commit
/// - `read_page` only returns committed records
pub trait LogDriver: Send + Sync {
    /// Commits a single record and returns the range it occupies.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::StorageUnavailable`] if nothing was
    /// committed and [`crate::LogError::AmbiguousWrite`] if the outcome is
    /// unknown.
    fn append(&self, stream: &str, payload: &[u8]) -> LogResult<OffsetRange>;

    /// Uploads the payload at position `index` of a batch.
    ///
    /// Never touches the committed tail. May be called concurrently for
    /// different indexes of the same batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be persisted.
    fn stage(&self, batch: BatchId, index: u32, payload: &[u8]) -> LogResult<()>;

    /// Persists the manifest of a batch whose payloads are all staged.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be persisted.
    fn seal(&self, manifest: &BatchManifest) -> LogResult<()>;

    /// Atomically splices a sealed batch into the log.
    ///
    /// Importing a batch that is already committed returns
    /// [`ImportOutcome::AlreadyCommitted`] with the original range.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::IncompleteBatch`] if the batch is not
    /// sealed or its staged payloads do not match the manifest.
    fn import(&self, batch: BatchId) -> LogResult<ImportOutcome>;

    /// Removes the staged data of an uncommitted batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged data cannot be listed or removed.
    fn discard(&self, batch: BatchId) -> LogResult<()>;

    /// Returns up to `max_records` committed records with
    /// `from <= offset < until`, in offset order.
    ///
    /// If a record cannot be read after earlier ones in the page were, the
    /// page ends before it. The failure is reported by the next call, which
    /// starts at that record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or holds corrupt data.
    fn read_page(
        &self,
        from: StorageOffset,
        until: StorageOffset,
        max_records: usize,
    ) -> LogResult<Vec<RetrievedRecord>>;

    /// Returns the offset just past the last committed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit pointer cannot be read.
    fn tail(&self) -> LogResult<StorageOffset>;

    /// Describes the backend for diagnostics.
    fn describe(&self) -> DriverInfo;
}

/// Which kind of backend a driver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local filesystem directory.
    Files,
    /// Cloud-style blob store.
    Blob,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files => f.write_str("files"),
            Self::Blob => f.write_str("blob"),
        }
    }
}

/// Diagnostic description of a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Backend kind.
    pub kind: BackendKind,
    /// Directory or container the log lives in.
    pub location: String,
}

impl fmt::Display for DriverInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} log at {}", self.kind, self.location)
    }
}
