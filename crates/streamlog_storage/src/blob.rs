//! Blob-store trait definition.
//!
//! A blob store is a flat namespace of immutable-per-version byte objects,
//! modelled on cloud object storage: whole-object uploads, ranged reads,
//! listing by prefix and conditional writes keyed on an opaque version
//! (an ETag in most cloud APIs).

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Opaque version of a stored blob.
///
/// Versions change on every successful write of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobVersion(pub u64);

impl fmt::Display for BlobVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Metadata of a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMeta {
    /// Size of the blob in bytes.
    pub len: u64,
    /// Current version.
    pub version: BlobVersion,
}

/// A blob fetched together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// The blob contents.
    pub data: Vec<u8>,
    /// Version the contents belong to.
    pub version: BlobVersion,
}

/// Condition attached to a blob upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional overwrite.
    Always,
    /// Succeeds only if no blob with the name exists.
    IfAbsent,
    /// Succeeds only if the blob currently has the given version.
    IfMatch(BlobVersion),
}

/// A cloud-style object store.
///
/// # Invariants
///
/// - A successful `put` is atomic: readers observe either the previous
///   contents or the new contents, never a mix
/// - A conditional `put` whose condition does not hold fails with
///   [`StorageError::PreconditionFailed`] and changes nothing
/// - `list` returns names in lexicographic order
///
/// # Implementors
///
/// - [`super::InMemoryBlobStore`] - For tests and ephemeral logs
/// - [`super::DirectoryBlobStore`] - Filesystem emulator of an object store
pub trait BlobStore: Send + Sync {
    /// Fetches a whole blob, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn get(&self, name: &str) -> StorageResult<Option<Blob>>;

    /// Reads `len` bytes of a blob starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the blob does not exist and
    /// [`StorageError::ReadPastEnd`] if the range exceeds the blob.
    fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns blob metadata, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>>;

    /// Uploads a blob under the given condition.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PreconditionFailed`] if the condition does not
    /// hold, or another error if the upload fails.
    fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion>;

    /// Deletes a blob. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn delete(&self, name: &str) -> StorageResult<bool>;

    /// Lists blob names starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Checks that a blob name is portable across stores.
///
/// Names are `/`-separated segments of ASCII letters, digits, `.`, `-` and
/// `_`. Empty segments and the segments `.` and `..` are rejected.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] for a rejected name.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        });

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName {
            name: name.to_string(),
        })
    }
}
