//! Error types for the event log.
//!
//! Every failure crossing the public boundary is a [`LogError`]. Storage
//! failures are wrapped together with an [`ErrorContext`] naming the
//! operation, stream tag, batch and offset involved, so callers can decide
//! whether a retry is safe.

use crate::offset::StorageOffset;
use std::fmt;
use std::path::PathBuf;
use streamlog_storage::StorageError;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// The log operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Opening a log or recovering its state.
    Open,
    /// Single-event append.
    WriteEvent,
    /// Uploading a record to the staging area.
    StageBatch,
    /// Persisting the manifest of a fully staged batch.
    SealBatch,
    /// Splicing a staged batch into the log.
    ImportBatch,
    /// Removing uncommitted staged data.
    DiscardBatch,
    /// Reading committed records.
    ReadEvents,
    /// Reading the committed tail.
    ReadTail,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::WriteEvent => "write event",
            Self::StageBatch => "stage batch",
            Self::SealBatch => "seal batch",
            Self::ImportBatch => "import batch",
            Self::DiscardBatch => "discard batch",
            Self::ReadEvents => "read events",
            Self::ReadTail => "read tail",
        };
        f.write_str(name)
    }
}

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation that failed.
    pub operation: Operation,
    /// Stream tag involved, if any.
    pub stream: Option<String>,
    /// Batch involved, if any.
    pub batch: Option<String>,
    /// Log offset involved, if known.
    pub offset: Option<StorageOffset>,
}

impl ErrorContext {
    /// Creates a context for `operation`.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            stream: None,
            batch: None,
            offset: None,
        }
    }

    /// Attaches a stream tag.
    #[must_use]
    pub fn with_stream(mut self, stream: &str) -> Self {
        self.stream = Some(stream.to_string());
        self
    }

    /// Attaches a batch identifier.
    #[must_use]
    pub fn with_batch(mut self, batch: impl fmt::Display) -> Self {
        self.batch = Some(batch.to_string());
        self
    }

    /// Attaches a log offset.
    #[must_use]
    pub fn with_offset(mut self, offset: StorageOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Wraps a storage failure.
    ///
    /// Corruption stays corruption; everything else is reported as
    /// [`LogError::StorageUnavailable`].
    #[must_use]
    pub fn storage(self, source: StorageError) -> LogError {
        match source {
            StorageError::Corrupted(message) => LogError::Corrupted {
                message: format!("{self}: {message}"),
            },
            source => LogError::StorageUnavailable {
                context: self,
                source,
            },
        }
    }

    /// Reports a commit whose durability could not be determined.
    #[must_use]
    pub fn ambiguous(self, message: impl Into<String>, source: Option<StorageError>) -> LogError {
        LogError::AmbiguousWrite {
            context: self,
            message: message.into(),
            source,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        let mut details = Vec::new();
        if let Some(stream) = &self.stream {
            details.push(format!("stream '{stream}'"));
        }
        if let Some(batch) = &self.batch {
            details.push(format!("batch {batch}"));
        }
        if let Some(offset) = self.offset {
            details.push(offset.to_string());
        }
        if !details.is_empty() {
            write!(f, " ({})", details.join(", "))?;
        }
        Ok(())
    }
}

/// Broad classification of a [`LogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; never retried.
    InvalidArgument,
    /// Transient backend failure.
    StorageUnavailable,
    /// A write whose durability is unknown.
    AmbiguousWrite,
    /// Import of a batch that is not completely staged.
    IncompleteBatch,
    /// Durable data failed validation.
    Corrupted,
    /// Another process owns the log.
    Locked,
}

/// Errors that can occur in event log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Malformed input at the API boundary.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// The backend failed; the operation did not take effect.
    #[error("storage unavailable during {context}: {source}")]
    StorageUnavailable {
        /// Where the failure happened.
        context: ErrorContext,
        /// The underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// The write may or may not have become durable.
    ///
    /// Retrying a single-event write after this error can produce a
    /// duplicate record at a new offset.
    #[error("ambiguous write during {context}: {message}")]
    AmbiguousWrite {
        /// Where the failure happened.
        context: ErrorContext,
        /// Why the outcome is unknown.
        message: String,
        /// The underlying storage failure, if any.
        #[source]
        source: Option<StorageError>,
    },

    /// Import was requested for a batch that is not sealed or not intact.
    #[error("batch {batch} is not fully staged: {message}")]
    IncompleteBatch {
        /// The batch identifier.
        batch: String,
        /// What is missing or mismatched.
        message: String,
    },

    /// Durable data failed a format or checksum check.
    #[error("log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the log directory lock.
    #[error("log locked: another process has exclusive access to {}", path.display())]
    LogLocked {
        /// The locked directory.
        path: PathBuf,
    },
}

impl LogError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an incomplete batch error.
    pub fn incomplete_batch(batch: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::IncompleteBatch {
            batch: batch.to_string(),
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::AmbiguousWrite { .. } => ErrorKind::AmbiguousWrite,
            Self::IncompleteBatch { .. } => ErrorKind::IncompleteBatch,
            Self::Corrupted { .. } => ErrorKind::Corrupted,
            Self::LogLocked { .. } => ErrorKind::Locked,
        }
    }

    /// Returns true if the failed operation did not take effect and may be
    /// retried as is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Returns the context of a storage-level failure.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::StorageUnavailable { context, .. } | Self::AmbiguousWrite { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

/// Attaches an [`ErrorContext`] to storage results.
pub(crate) trait ResultExt<T> {
    /// Maps the error through [`ErrorContext::storage`].
    fn context(self, ctx: &ErrorContext) -> LogResult<T>;
}

impl<T, E: Into<StorageError>> ResultExt<T> for Result<T, E> {
    fn context(self, ctx: &ErrorContext) -> LogResult<T> {
        self.map_err(|e| ctx.clone().storage(e.into()))
    }
}
