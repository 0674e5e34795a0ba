//! Test fixtures and log helpers.
//!
//! Provides temporary logs on every backend, cleaned up on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamlog_core::{Config, EventLogClient, RetrievedRecord, StorageOffset};
use streamlog_storage::{BlobStore, DirectoryBlobStore, InMemoryBlobStore};
use tempfile::TempDir;

/// The backends a test log can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBackend {
    /// Blob driver over an in-memory store.
    Memory,
    /// File driver in a temporary directory.
    Files,
    /// Blob driver over a directory-emulated store.
    BlobDirectory,
}

impl TestBackend {
    /// Every backend, in a stable order.
    pub const ALL: [Self; 3] = [Self::Memory, Self::Files, Self::BlobDirectory];
}

/// A test log with automatic cleanup.
pub struct TestLog {
    /// The client.
    pub log: EventLogClient,
    backend: TestBackend,
    config: Config,
    memory: Option<Arc<InMemoryBlobStore>>,
    _temp_dir: Option<TempDir>,
}

impl TestLog {
    /// Creates a log on `backend` with default configuration.
    pub fn new(backend: TestBackend) -> Self {
        Self::with_config(backend, Config::default())
    }

    /// Creates a log on `backend`.
    pub fn with_config(backend: TestBackend, config: Config) -> Self {
        match backend {
            TestBackend::Memory => {
                let store = Arc::new(InMemoryBlobStore::new());
                let log = EventLogClient::open_blob(store.clone(), "log", config.clone())
                    .expect("Failed to open in-memory log");
                Self {
                    log,
                    backend,
                    config,
                    memory: Some(store),
                    _temp_dir: None,
                }
            }
            TestBackend::Files | TestBackend::BlobDirectory => {
                let temp_dir = TempDir::new().expect("Failed to create temp directory");
                let log = open_on_disk(backend, temp_dir.path(), config.clone());
                Self {
                    log,
                    backend,
                    config,
                    memory: None,
                    _temp_dir: Some(temp_dir),
                }
            }
        }
    }

    /// Creates an in-memory test log.
    pub fn memory() -> Self {
        Self::new(TestBackend::Memory)
    }

    /// Creates a file-driver test log.
    pub fn files() -> Self {
        Self::new(TestBackend::Files)
    }

    /// Creates a blob-driver test log over a directory store.
    pub fn blob_dir() -> Self {
        Self::new(TestBackend::BlobDirectory)
    }

    /// Returns the backend.
    pub fn backend(&self) -> TestBackend {
        self.backend
    }

    /// Returns the directory holding the log, if on disk.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(dir_name(self.backend)))
    }

    /// Closes the log and opens it again from its durable state.
    ///
    /// Clones of the old client must be dropped first; the file backend
    /// holds an exclusive lock.
    pub fn reopen(self) -> Self {
        let Self {
            log,
            backend,
            config,
            memory,
            _temp_dir: temp_dir,
        } = self;
        drop(log);

        let log = match (&memory, &temp_dir) {
            (Some(store), _) => {
                EventLogClient::open_blob(store.clone() as Arc<dyn BlobStore>, "log", config.clone())
                    .expect("Failed to reopen in-memory log")
            }
            (None, Some(temp_dir)) => open_on_disk(backend, temp_dir.path(), config.clone()),
            (None, None) => unreachable!("test log without storage"),
        };

        Self {
            log,
            backend,
            config,
            memory,
            _temp_dir: temp_dir,
        }
    }

    /// Reads every committed record.
    pub fn scan(&self) -> Vec<RetrievedRecord> {
        scan_from(&self.log, StorageOffset::ZERO)
    }
}

impl std::ops::Deref for TestLog {
    type Target = EventLogClient;

    fn deref(&self) -> &Self::Target {
        &self.log
    }
}

fn dir_name(backend: TestBackend) -> &'static str {
    match backend {
        TestBackend::BlobDirectory => "blobs",
        _ => "log",
    }
}

fn open_on_disk(backend: TestBackend, temp: &Path, config: Config) -> EventLogClient {
    let root = temp.join(dir_name(backend));
    match backend {
        TestBackend::Files => {
            EventLogClient::open_files(&root, config).expect("Failed to open file log")
        }
        _ => {
            let store = DirectoryBlobStore::open(&root).expect("Failed to open blob directory");
            EventLogClient::open_blob(Arc::new(store), "log", config)
                .expect("Failed to open blob log")
        }
    }
}

/// Reads every committed record at or after `start`, panicking on errors.
pub fn scan_from(log: &EventLogClient, start: StorageOffset) -> Vec<RetrievedRecord> {
    log.read_all_events(start, None)
        .collect::<Result<_, _>>()
        .expect("Failed to scan log")
}

/// Runs a test with a temporary in-memory log.
///
/// # Example
///
/// ```rust,ignore
/// use streamlog_testkit::with_temp_log;
///
/// #[test]
/// fn my_test() {
///     with_temp_log(|log| {
///         log.write_event("s", b"x").unwrap();
///     });
/// }
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&EventLogClient) -> R,
{
    let test_log = TestLog::memory();
    f(&test_log.log)
}

/// Runs a test once against a fresh log on every backend.
pub fn for_each_backend<F>(mut f: F)
where
    F: FnMut(&TestLog),
{
    for backend in TestBackend::ALL {
        let test_log = TestLog::new(backend);
        f(&test_log);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a log with `count` single events on stream `"seed"`.
    pub fn populated_log(backend: TestBackend, count: usize) -> TestLog {
        let test_log = TestLog::new(backend);
        for i in 0..count {
            test_log
                .write_event("seed", format!("event-{i}"))
                .expect("Failed to write seed event");
        }
        test_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_backend_writes_and_reads() {
        let mut seen = Vec::new();
        for_each_backend(|log| {
            log.write_event("s", b"x").unwrap();
            assert_eq!(log.scan().len(), 1);
            seen.push(log.backend());
        });
        assert_eq!(seen, TestBackend::ALL);
    }

    #[test]
    fn test_reopen_keeps_records() {
        for backend in TestBackend::ALL {
            let log = scenarios::populated_log(backend, 5);
            let tail = log.tail().unwrap();
            let log = log.reopen();
            assert_eq!(log.tail().unwrap(), tail, "{backend:?}");
            assert_eq!(log.scan().len(), 5, "{backend:?}");
        }
    }

    #[test]
    fn test_paths() {
        assert!(TestLog::memory().path().is_none());
        assert!(TestLog::files().path().unwrap().ends_with("log"));
        assert!(TestLog::blob_dir().path().unwrap().ends_with("blobs"));
    }
}
