//! Fault injection for stores.
//!
//! The wrappers forward to an inner store until a fault is armed. Most
//! armed faults fail the next N matching calls with an unavailable error
//! and leave the inner store untouched. [`FaultyBlobStore::lose_put_ack`]
//! and [`TornFileBackend`] model failures that did reach storage.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamlog_storage::{
    Blob, BlobMeta, BlobStore, BlobVersion, FileBackend, PutCondition, StorageBackend,
    StorageError, StorageResult,
};

type AfterPut = Box<dyn FnOnce() + Send>;

/// Consumes one armed fault, returning `true` if the call must fail.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A blob store that fails on demand.
pub struct FaultyBlobStore {
    inner: Arc<dyn BlobStore>,
    put_suffix: Mutex<String>,
    put_failures: AtomicU32,
    get_suffix: Mutex<String>,
    get_skips: AtomicU32,
    get_failures: AtomicU32,
    lost_ack: Mutex<Option<(String, AfterPut)>>,
    offline: AtomicBool,
}

impl FaultyBlobStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            put_suffix: Mutex::new(String::new()),
            put_failures: AtomicU32::new(0),
            get_suffix: Mutex::new(String::new()),
            get_skips: AtomicU32::new(0),
            get_failures: AtomicU32::new(0),
            lost_ack: Mutex::new(None),
            offline: AtomicBool::new(false),
        }
    }

    /// Fails the next `count` uploads whose name ends with `suffix`.
    pub fn fail_puts(&self, suffix: &str, count: u32) {
        *self.put_suffix.lock() = suffix.to_string();
        self.put_failures.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` whole-blob reads whose name ends with `suffix`.
    pub fn fail_gets(&self, suffix: &str, count: u32) {
        self.fail_gets_after(suffix, 0, count);
    }

    /// Lets `skip` matching reads through, then fails the next `count`.
    pub fn fail_gets_after(&self, suffix: &str, skip: u32, count: u32) {
        *self.get_suffix.lock() = suffix.to_string();
        self.get_skips.store(skip, Ordering::SeqCst);
        self.get_failures.store(count, Ordering::SeqCst);
    }

    /// Lets the next upload whose name ends with `suffix` land, runs
    /// `then`, and only then reports the upload as failed.
    ///
    /// `then` can commit through a second client to model a rival writer
    /// racing a lost acknowledgement.
    pub fn lose_put_ack(&self, suffix: &str, then: impl FnOnce() + Send + 'static) {
        *self.lost_ack.lock() = Some((suffix.to_string(), Box::new(then)));
    }

    /// Fails every call until set back to `false`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Disarms every fault.
    pub fn heal(&self) {
        self.put_failures.store(0, Ordering::SeqCst);
        self.get_skips.store(0, Ordering::SeqCst);
        self.get_failures.store(0, Ordering::SeqCst);
        *self.lost_ack.lock() = None;
        self.set_offline(false);
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected outage"));
        }
        Ok(())
    }
}

impl BlobStore for FaultyBlobStore {
    fn get(&self, name: &str) -> StorageResult<Option<Blob>> {
        self.check_online()?;
        if name.ends_with(self.get_suffix.lock().as_str())
            && !take(&self.get_skips)
            && take(&self.get_failures)
        {
            return Err(StorageError::unavailable(format!("injected read failure on {name}")));
        }
        self.inner.get(name)
    }

    fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.check_online()?;
        self.inner.get_range(name, offset, len)
    }

    fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>> {
        self.check_online()?;
        self.inner.head(name)
    }

    fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion> {
        self.check_online()?;
        if name.ends_with(self.put_suffix.lock().as_str()) && take(&self.put_failures) {
            return Err(StorageError::unavailable(format!("injected upload failure on {name}")));
        }

        let lost = {
            let mut slot = self.lost_ack.lock();
            if slot.as_ref().is_some_and(|(suffix, _)| name.ends_with(suffix.as_str())) {
                slot.take()
            } else {
                None
            }
        };
        if let Some((_, then)) = lost {
            self.inner.put(name, data, condition)?;
            then();
            return Err(StorageError::unavailable(format!(
                "injected lost acknowledgement on {name}"
            )));
        }
        self.inner.put(name, data, condition)
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        self.check_online()?;
        self.inner.delete(name)
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check_online()?;
        self.inner.list(prefix)
    }
}

/// A byte store that fails on demand.
///
/// A failed append writes half of its bytes first, the way a crash or a
/// full disk leaves a torn tail.
pub struct FaultyBackend {
    inner: Arc<dyn StorageBackend>,
    append_failures: AtomicU32,
    sync_failures: AtomicU32,
}

impl FaultyBackend {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            append_failures: AtomicU32::new(0),
            sync_failures: AtomicU32::new(0),
        }
    }

    /// Fails the next `count` appends.
    pub fn fail_appends(&self, count: u32) {
        self.append_failures.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` syncs.
    pub fn fail_syncs(&self, count: u32) {
        self.sync_failures.store(count, Ordering::SeqCst);
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        if take(&self.append_failures) {
            self.inner.append(&data[..data.len() / 2])?;
            return Err(StorageError::unavailable("injected append failure"));
        }
        self.inner.append(data)
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&self) -> StorageResult<()> {
        if take(&self.sync_failures) {
            return Err(StorageError::unavailable("injected sync failure"));
        }
        self.inner.sync()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// A real file store whose failing appends leave bytes it never counted.
///
/// This is what a `write_all` cut short by a full disk or a file size
/// limit leaves behind: the bytes are in the file but `size()` does not
/// report them.
pub struct TornFileBackend {
    inner: FileBackend,
    path: PathBuf,
    tears: AtomicU32,
}

impl TornFileBackend {
    /// Opens the file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self {
            inner: FileBackend::open(path)?,
            path: path.to_path_buf(),
            tears: AtomicU32::new(0),
        })
    }

    /// Tears the next `count` appends.
    pub fn tear_appends(&self, count: u32) {
        self.tears.store(count, Ordering::SeqCst);
    }
}

impl StorageBackend for TornFileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        if take(&self.tears) {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(&data[..data.len() / 2])?;
            return Err(StorageError::Io(std::io::Error::other("injected torn write")));
        }
        self.inner.append(data)
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
