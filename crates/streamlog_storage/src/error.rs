//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Stored bytes failed validation.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The named blob does not exist.
    #[error("blob not found: {name}")]
    NotFound {
        /// Name of the missing blob.
        name: String,
    },

    /// A conditional write lost against a concurrent writer.
    #[error("precondition failed for blob {name}")]
    PreconditionFailed {
        /// Name of the blob whose condition did not hold.
        name: String,
    },

    /// The store rejected a blob name.
    #[error("invalid blob name: {name}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The store could not be reached (network, throttling, injected fault).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns true if a conditional write lost a race.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }
}
