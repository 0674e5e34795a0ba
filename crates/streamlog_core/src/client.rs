//! Event log client facade.

use crate::config::{BackendConfig, BlobEndpoint, Config, DEFAULT_CONTAINER};
use crate::driver::{BlobLogDriver, DriverInfo, FileLogDriver, LogDriver};
use crate::error::{ErrorContext, LogResult, Operation, ResultExt};
use crate::offset::StorageOffset;
use crate::reader::RecordReader;
use crate::record::RecordForStaging;
use crate::staging::{CommittedBatch, StagingPipeline};
use std::path::Path;
use std::sync::Arc;
use streamlog_storage::{BlobStore, DirectoryBlobStore, InMemoryBlobStore};

/// The main log handle.
///
/// `EventLogClient` is the entry point for producers and consumers. It holds
/// no mutable state of its own: every write funnels into the backend driver,
/// which assigns offsets. Clones share the same driver and may be used from
/// any number of threads.
///
/// # Opening a Log
///
/// ```rust,ignore
/// use streamlog_core::{Config, EventLogClient, StorageOffset};
/// use std::path::Path;
///
/// let log = EventLogClient::open_files(Path::new("events"), Config::default())?;
///
/// log.write_event("orders", b"order placed")?;
/// log.write_events_in_large_batch("orders", vec![b"a".to_vec(), b"b".to_vec()])?;
///
/// for record in log.read_all_events(StorageOffset::ZERO, None) {
///     let record = record?;
///     println!("{} {}", record.offset, record.stream);
/// }
/// ```
///
/// # In-Memory Logs
///
/// For tests, use `EventLogClient::in_memory()`:
///
/// ```rust,ignore
/// let log = EventLogClient::in_memory()?;
/// ```
#[derive(Clone)]
pub struct EventLogClient {
    driver: Arc<dyn LogDriver>,
    staging: StagingPipeline,
    config: Config,
}

impl EventLogClient {
    /// Opens the log a [`BackendConfig`] points at.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the backend
    /// cannot be opened.
    pub fn open(backend: &BackendConfig, config: Config) -> LogResult<Self> {
        match backend {
            BackendConfig::Files { root } => Self::open_files(root, config),
            BackendConfig::Blob { store, container } => {
                let store: Arc<dyn BlobStore> = match store {
                    BlobEndpoint::Memory => Arc::new(InMemoryBlobStore::new()),
                    BlobEndpoint::Directory(root) => Arc::new(
                        DirectoryBlobStore::open(root)
                            .context(&ErrorContext::new(Operation::Open))?,
                    ),
                };
                Self::open_blob(store, container, config)
            }
        }
    }

    /// Opens a log stored as files under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the log locked (`LogLocked`)
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Recovery finds corrupt data (`Corrupted`)
    pub fn open_files(root: &Path, config: Config) -> LogResult<Self> {
        let driver = FileLogDriver::open(root, config.clone())?;
        Ok(Self::with_driver(Arc::new(driver), config))
    }

    /// Opens a log stored in `container` of a blob store.
    ///
    /// Any [`BlobStore`] works here, including adapters for real cloud
    /// object stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the container name is invalid, the log doesn't
    /// exist and `create_if_missing` is false, or the store is unreachable.
    pub fn open_blob(store: Arc<dyn BlobStore>, container: &str, config: Config) -> LogResult<Self> {
        let driver = BlobLogDriver::open(store, container, config.clone())?;
        Ok(Self::with_driver(Arc::new(driver), config))
    }

    /// Opens a fresh log in process memory.
    ///
    /// Data is lost when the last clone is dropped.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other
    /// constructors.
    pub fn in_memory() -> LogResult<Self> {
        Self::open_blob(
            Arc::new(InMemoryBlobStore::new()),
            DEFAULT_CONTAINER,
            Config::default(),
        )
    }

    /// Wraps an already opened driver.
    #[must_use]
    pub fn with_driver(driver: Arc<dyn LogDriver>, config: Config) -> Self {
        Self {
            staging: StagingPipeline::new(Arc::clone(&driver), config.clone()),
            driver,
            config,
        }
    }

    /// Appends one record and returns its offset.
    ///
    /// The call blocks until the record is durable. There is no staging
    /// round trip, so this is the low-latency path.
    ///
    /// Retrying is **not idempotent**. After an
    /// [`AmbiguousWrite`](crate::LogError::AmbiguousWrite) the record may
    /// already be committed, and writing it again can produce a duplicate at
    /// a new offset. A [`StorageUnavailable`](crate::LogError::StorageUnavailable)
    /// failure committed nothing and is safe to retry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad stream tag or oversized payload.
    pub fn write_event(&self, stream: &str, payload: impl AsRef<[u8]>) -> LogResult<StorageOffset> {
        let range = self.driver.append(stream, payload.as_ref())?;
        Ok(range.start)
    }

    /// Appends many records as one atomic batch.
    ///
    /// The records are staged in parallel, then imported in one step: they
    /// become visible together at a contiguous range, in the order the
    /// iterator produced them. If anything fails, none of them are visible.
    /// An empty iterator commits nothing.
    ///
    /// # Errors
    ///
    /// Returns the staging error, or the import error once retries are
    /// exhausted.
    pub fn write_events_in_large_batch<I>(&self, stream: &str, payloads: I) -> LogResult<CommittedBatch>
    where
        I: IntoIterator,
        I::Item: Into<RecordForStaging>,
    {
        self.staging.write_batch(stream, payloads)
    }

    /// Reads committed records with offsets at or after `start`.
    ///
    /// The reader stops at `max_record_count` records or at the tail
    /// observed on its first pull, whichever comes first. It never waits
    /// for new writes.
    #[must_use]
    pub fn read_all_events(&self, start: StorageOffset, max_record_count: Option<usize>) -> RecordReader {
        RecordReader::new(
            Arc::clone(&self.driver),
            start,
            max_record_count,
            self.config.read_page_size,
        )
    }

    /// Reads every committed record from the beginning.
    #[must_use]
    pub fn read_all(&self) -> RecordReader {
        self.read_all_events(StorageOffset::ZERO, None)
    }

    /// Returns the two-phase staging API.
    #[must_use]
    pub fn staging(&self) -> &StagingPipeline {
        &self.staging
    }

    /// Returns the offset just past the last committed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit pointer cannot be read.
    pub fn tail(&self) -> LogResult<StorageOffset> {
        self.driver.tail()
    }

    /// Describes the backend.
    #[must_use]
    pub fn driver_info(&self) -> DriverInfo {
        self.driver.describe()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for EventLogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogClient")
            .field("driver", &self.driver.describe())
            .finish_non_exhaustive()
    }
}
