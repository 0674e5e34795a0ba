//! In-memory blob store.

use crate::blob::{validate_blob_name, Blob, BlobMeta, BlobStore, BlobVersion, PutCondition};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory blob store.
///
/// Conditional writes are checked and applied under one lock, which gives
/// the same compare-and-swap semantics a cloud store offers through ETags.
///
/// # Example
///
/// ```rust
/// use streamlog_storage::{BlobStore, InMemoryBlobStore, PutCondition};
///
/// let store = InMemoryBlobStore::new();
/// let v1 = store.put("log/head", b"1", PutCondition::IfAbsent).unwrap();
/// store.put("log/head", b"2", PutCondition::IfMatch(v1)).unwrap();
/// assert!(store.put("log/head", b"3", PutCondition::IfMatch(v1)).is_err());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    blobs: BTreeMap<String, Blob>,
    next_version: u64,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().blobs.len()
    }

    /// Returns true if the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().blobs.is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, name: &str) -> StorageResult<Option<Blob>> {
        validate_blob_name(name)?;
        Ok(self.state.read().blobs.get(name).cloned())
    }

    fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        validate_blob_name(name)?;
        let state = self.state.read();
        let blob = state.blobs.get(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        let size = blob.data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(blob.data[offset as usize..end as usize].to_vec())
    }

    fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>> {
        validate_blob_name(name)?;
        Ok(self.state.read().blobs.get(name).map(|blob| BlobMeta {
            len: blob.data.len() as u64,
            version: blob.version,
        }))
    }

    fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion> {
        validate_blob_name(name)?;
        let mut state = self.state.write();

        let current = state.blobs.get(name).map(|blob| blob.version);
        let holds = match condition {
            PutCondition::Always => true,
            PutCondition::IfAbsent => current.is_none(),
            PutCondition::IfMatch(expected) => current == Some(expected),
        };
        if !holds {
            return Err(StorageError::PreconditionFailed {
                name: name.to_string(),
            });
        }

        state.next_version += 1;
        let version = BlobVersion(state.next_version);
        state.blobs.insert(
            name.to_string(),
            Blob {
                data: data.to_vec(),
                version,
            },
        );
        Ok(version)
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        validate_blob_name(name)?;
        Ok(self.state.write().blobs.remove(name).is_some())
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let state = self.state.read();
        Ok(state
            .blobs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryBlobStore::new();
        assert!(store.get("nothing").unwrap().is_none());
        assert!(store.head("nothing").unwrap().is_none());
        assert!(matches!(
            store.get_range("nothing", 0, 1),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn put_if_absent_only_once() {
        let store = InMemoryBlobStore::new();
        store.put("a", b"first", PutCondition::IfAbsent).unwrap();
        let err = store.put("a", b"second", PutCondition::IfAbsent).unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(store.get("a").unwrap().unwrap().data, b"first");
    }

    #[test]
    fn versions_change_on_every_write() {
        let store = InMemoryBlobStore::new();
        let v1 = store.put("a", b"x", PutCondition::Always).unwrap();
        let v2 = store.put("a", b"x", PutCondition::Always).unwrap();
        assert_ne!(v1, v2);
        assert_eq!(store.head("a").unwrap().unwrap().version, v2);
    }

    #[test]
    fn ranged_read() {
        let store = InMemoryBlobStore::new();
        store.put("a", b"hello world", PutCondition::Always).unwrap();
        assert_eq!(store.get_range("a", 6, 5).unwrap(), b"world");
        assert!(matches!(
            store.get_range("a", 6, 50),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn list_by_prefix_is_sorted() {
        let store = InMemoryBlobStore::new();
        for name in ["log/b", "log/a", "other/c", "log/c"] {
            store.put(name, b"", PutCondition::Always).unwrap();
        }
        assert_eq!(store.list("log/").unwrap(), vec!["log/a", "log/b", "log/c"]);
        assert!(store.delete("log/a").unwrap());
        assert!(!store.delete("log/a").unwrap());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn compare_and_swap_admits_one_winner_per_version() {
        let store = Arc::new(InMemoryBlobStore::new());
        let v0 = store.put("head", b"0", PutCondition::Always).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .put("head", format!("{i}").as_bytes(), PutCondition::IfMatch(v0))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
