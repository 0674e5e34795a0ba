//! Log configuration.

use crate::error::{LogError, LogResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Tuning knobs for opening a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether to create the log if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync record bytes before publishing a commit.
    pub sync_on_commit: bool,

    /// Maximum payload size of a single record in bytes.
    pub max_payload_size: usize,

    /// Maximum stream tag length in bytes.
    pub max_stream_name_len: usize,

    /// Records fetched per backend round trip while reading.
    pub read_page_size: usize,

    /// Worker threads uploading staged records.
    pub staging_parallelism: usize,

    /// Records pulled from the producer iterator per staging window.
    pub staging_window: usize,

    /// Total attempts for one batch import.
    pub import_attempts: u32,

    /// Base delay between import attempts, in milliseconds.
    pub import_retry_base_delay_ms: u64,

    /// Attempts at winning the blob head compare-and-swap per commit.
    pub max_commit_attempts: u32,

    /// Bytes between sparse-index checkpoints in the file driver.
    pub index_stride: u64,

    /// Whether to verify record checksums while recovering a local log.
    pub verify_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            max_payload_size: 4 * 1024 * 1024, // 4 MiB
            max_stream_name_len: 1024,
            read_page_size: 1000,
            staging_parallelism: 4,
            staging_window: 4096,
            import_attempts: 3,
            import_retry_base_delay_ms: 50,
            max_commit_attempts: 64,
            index_stride: 64 * 1024, // 64 KiB
            verify_on_open: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the log if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync record bytes on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub const fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets the maximum stream tag length.
    #[must_use]
    pub const fn max_stream_name_len(mut self, len: usize) -> Self {
        self.max_stream_name_len = len;
        self
    }

    /// Sets the read page size.
    #[must_use]
    pub const fn read_page_size(mut self, records: usize) -> Self {
        self.read_page_size = records;
        self
    }

    /// Sets the number of staging workers.
    #[must_use]
    pub const fn staging_parallelism(mut self, workers: usize) -> Self {
        self.staging_parallelism = workers;
        self
    }

    /// Sets the staging window.
    #[must_use]
    pub const fn staging_window(mut self, records: usize) -> Self {
        self.staging_window = records;
        self
    }

    /// Sets the number of import attempts.
    #[must_use]
    pub const fn import_attempts(mut self, attempts: u32) -> Self {
        self.import_attempts = attempts;
        self
    }

    /// Sets the base import retry delay.
    #[must_use]
    pub const fn import_retry_base_delay_ms(mut self, millis: u64) -> Self {
        self.import_retry_base_delay_ms = millis;
        self
    }

    /// Sets the blob commit attempt bound.
    #[must_use]
    pub const fn max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts;
        self
    }

    /// Sets the sparse-index stride.
    #[must_use]
    pub const fn index_stride(mut self, bytes: u64) -> Self {
        self.index_stride = bytes;
        self
    }

    /// Sets whether to verify checksums on open.
    #[must_use]
    pub const fn verify_on_open(mut self, value: bool) -> Self {
        self.verify_on_open = value;
        self
    }

    /// Checks that every knob is usable.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] naming the first bad knob.
    pub fn validate(&self) -> LogResult<()> {
        let zero = [
            ("max_stream_name_len", self.max_stream_name_len == 0),
            ("read_page_size", self.read_page_size == 0),
            ("staging_parallelism", self.staging_parallelism == 0),
            ("staging_window", self.staging_window == 0),
            ("import_attempts", self.import_attempts == 0),
            ("max_commit_attempts", self.max_commit_attempts == 0),
            ("index_stride", self.index_stride == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(LogError::invalid_argument(format!(
                "config value {name} must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Where a blob-backed log keeps its objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobEndpoint {
    /// Process-local in-memory store.
    Memory,
    /// Object store emulated on a directory tree.
    Directory(PathBuf),
}

/// Selects and locates a storage backend.
///
/// Connection strings:
///
/// ```text
/// file://<root>
/// blob+dir://<root>?container=<name>
/// blob+mem://<container>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Local filesystem log rooted at a directory.
    Files {
        /// Log directory.
        root: PathBuf,
    },
    /// Cloud-blob log inside a container.
    Blob {
        /// The object store holding the container.
        store: BlobEndpoint,
        /// Container (name prefix) owning the log.
        container: String,
    },
}

/// Container used when a `blob+dir` connection string names none.
pub const DEFAULT_CONTAINER: &str = "log";

impl BackendConfig {
    /// Parses a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] for an unknown scheme, an empty
    /// location or an invalid container name.
    pub fn parse(connection: &str) -> LogResult<Self> {
        let (scheme, rest) = connection.split_once("://").ok_or_else(|| {
            LogError::invalid_argument(format!(
                "connection string '{connection}' has no scheme"
            ))
        })?;

        match scheme {
            "file" => {
                if rest.is_empty() {
                    return Err(LogError::invalid_argument("file:// needs a root directory"));
                }
                Ok(Self::Files {
                    root: PathBuf::from(rest),
                })
            }
            "blob+dir" => {
                let (root, query) = match rest.split_once('?') {
                    Some((root, query)) => (root, Some(query)),
                    None => (rest, None),
                };
                if root.is_empty() {
                    return Err(LogError::invalid_argument(
                        "blob+dir:// needs a root directory",
                    ));
                }
                let container = match query {
                    None => DEFAULT_CONTAINER.to_string(),
                    Some(query) => parse_container(query)?,
                };
                check_container(&container)?;
                Ok(Self::Blob {
                    store: BlobEndpoint::Directory(PathBuf::from(root)),
                    container,
                })
            }
            "blob+mem" => {
                check_container(rest)?;
                Ok(Self::Blob {
                    store: BlobEndpoint::Memory,
                    container: rest.to_string(),
                })
            }
            other => Err(LogError::invalid_argument(format!(
                "unknown backend scheme '{other}'"
            ))),
        }
    }
}

impl FromStr for BackendConfig {
    type Err = LogError;

    fn from_str(s: &str) -> LogResult<Self> {
        Self::parse(s)
    }
}

fn parse_container(query: &str) -> LogResult<String> {
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("container", value)) => return Ok(value.to_string()),
            Some(_) => {}
            None => {
                return Err(LogError::invalid_argument(format!(
                    "malformed query parameter '{pair}'"
                )))
            }
        }
    }
    Ok(DEFAULT_CONTAINER.to_string())
}

fn check_container(container: &str) -> LogResult<()> {
    if container.is_empty() || container.contains('/') {
        return Err(LogError::invalid_argument(format!(
            "invalid container name '{container}'"
        )));
    }
    streamlog_storage::validate_blob_name(container)
        .map_err(|e| LogError::invalid_argument(e.to_string()))
}
