//! In-memory byte store for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory byte store.
///
/// Backs driver unit tests, for example frame scanning and torn-tail
/// recovery, where a file would only add noise.
///
/// # Example
///
/// ```rust
/// use streamlog_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"test data").unwrap(), 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `bytes`, e.g. a log with a torn tail.
    #[must_use]
    pub fn with_data(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: RwLock::new(bytes.into()),
        }
    }

    /// Returns a snapshot of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        usize::try_from(offset)
            .ok()
            .and_then(|start| bytes.get(start..start.checked_add(len)?))
            .map(<[u8]>::to_vec)
            .ok_or(StorageError::ReadPastEnd {
                offset,
                len,
                size: bytes.len() as u64,
            })
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let start = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(start)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        match usize::try_from(new_size) {
            Ok(keep) if keep <= bytes.len() => {
                bytes.truncate(keep);
                Ok(())
            }
            _ => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot grow store from {} to {new_size} bytes by truncation",
                    bytes.len()
                ),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_contiguous() {
        let store = InMemoryBackend::new();
        assert_eq!(store.append(b"head").unwrap(), 0);
        assert_eq!(store.append(b"-tail").unwrap(), 4);
        assert_eq!(store.read_at(4, 5).unwrap(), b"-tail");
        assert_eq!(store.read_at(9, 0).unwrap(), b"");
    }

    #[test]
    fn reads_never_cross_the_end() {
        let store = InMemoryBackend::with_data(*b"frame");
        assert!(matches!(
            store.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
        assert!(store.read_at(u64::MAX, 1).is_err());
    }

    #[test]
    fn truncate_only_shrinks() {
        let store = InMemoryBackend::with_data(b"committed+torn".to_vec());
        store.truncate(9).unwrap();
        assert_eq!(store.data(), b"committed");
        assert!(store.truncate(100).is_err());
        assert_eq!(store.size().unwrap(), 9);
    }
}
