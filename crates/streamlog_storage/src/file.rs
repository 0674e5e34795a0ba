//! File-based byte store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// A file-based byte store.
///
/// The store keeps two handles on the file. Appends and truncation go
/// through the writer, which is opened in append mode and guarded by a
/// mutex. Reads use positional I/O on a separate handle and never take the
/// writer lock, so scans proceed while a writer is busy.
///
/// `size()` only advances after an append has fully reached the file, so
/// a reader bounded by `size()` never observes a partial append. A failed
/// append truncates whatever part of it was written.
///
/// # Durability
///
/// `sync()` calls `File::sync_all()` on the writer. Nothing is durable
/// before that.
///
/// # Example
///
/// ```no_run
/// use streamlog_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("stream.dat")).unwrap();
/// let offset = backend.append(b"frame bytes").unwrap();
/// backend.sync().unwrap();
/// assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
/// ```
#[derive(Debug)]
pub struct FileBackend {
    writer: Mutex<File>,
    reader: File,
    len: AtomicU64,
}

impl FileBackend {
    /// Opens or creates a byte store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let writer = OpenOptions::new().create(true).append(true).open(path)?;
        let reader = OpenOptions::new().read(true).open(path)?;
        let len = writer.metadata()?.len();

        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            len: AtomicU64::new(len),
        })
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> StorageResult<()> {
        use std::os::unix::fs::FileExt;
        self.reader.read_exact_at(buffer, offset)?;
        Ok(())
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buffer: &mut [u8], mut offset: u64) -> StorageResult<()> {
        use std::os::windows::fs::FileExt;
        while !buffer.is_empty() {
            match self.reader.seek_read(buffer, offset)? {
                0 => return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
                n => {
                    buffer = &mut buffer[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.len.load(Ordering::Acquire);
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            self.read_exact_at(&mut buffer, offset)?;
        }
        Ok(buffer)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut writer = self.writer.lock();
        let offset = self.len.load(Ordering::Acquire);
        if data.is_empty() {
            return Ok(offset);
        }

        if let Err(e) = writer.write_all(data) {
            // Cut off the torn bytes so the next append lands at `offset`.
            // If that fails too, expose them through `size()` so the caller
            // can still truncate them.
            if writer.set_len(offset).is_err() {
                if let Ok(meta) = writer.metadata() {
                    self.len.store(meta.len(), Ordering::Release);
                }
            }
            return Err(e.into());
        }
        self.len.store(offset + data.len() as u64, Ordering::Release);
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.len.load(Ordering::Acquire))
    }

    fn sync(&self) -> StorageResult<()> {
        self.writer.lock().sync_all()?;
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let writer = self.writer.lock();
        let current = self.len.load(Ordering::Acquire);
        if new_size > current {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot grow store from {current} to {new_size} bytes by truncation"),
            )));
        }

        writer.set_len(new_size)?;
        writer.sync_all()?;
        self.len.store(new_size, Ordering::Release);
        Ok(())
    }
}
