//! Byte-store trait definition.

use crate::error::StorageResult;

/// A low-level, append-only byte store.
///
/// Byte stores are **opaque**. They know nothing about record frames,
/// offsets of individual events or staged batches; the log layer above owns
/// every format decision.
///
/// All methods take `&self` so that one handle can be shared between the
/// single committing writer and any number of concurrent readers. Writers
/// are expected to serialize `append`/`truncate` externally.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes all appended bytes survive process termination
/// - `truncate` never grows the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size of the store in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// Used to discard bytes written past the last committed position.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than the current size
    fn truncate(&self, new_size: u64) -> StorageResult<()>;
}
