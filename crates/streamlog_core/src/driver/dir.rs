//! Local log directory management.
//!
//! This module handles the file system layout of a local log:
//!
//! ```text
//! <root>/
//! ├─ LOCK                      # Advisory lock for single-writer
//! ├─ HEAD                      # Commit pointer (see head.rs)
//! ├─ stream.dat                # Record frames
//! ├─ imports.log               # Journal of committed batch imports
//! └─ staging/<batch>/
//!    ├─ 00000000.rec           # Staged payloads, one per index
//!    └─ SEALED                 # Batch manifest, written last
//! ```
//!
//! The LOCK file ensures only one process can write to the log at a time.

use super::head::LogHead;
use crate::batch::BatchId;
use crate::error::{ErrorContext, LogError, LogResult, ResultExt};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use streamlog_storage::StorageResult;

const HEAD_FILE: &str = "HEAD";
const HEAD_TEMP: &str = "HEAD.tmp";
const LOCK_FILE: &str = "LOCK";
const STREAM_FILE: &str = "stream.dat";
const JOURNAL_FILE: &str = "imports.log";
const STAGING_DIR: &str = "staging";
const SEALED_FILE: &str = "SEALED";

/// Owns a log directory and its exclusive lock.
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    _lock_file: File,
}

impl LogDir {
    /// Opens or creates a log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `LogLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool, ctx: &ErrorContext) -> LogResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path).context(ctx)?;
            } else {
                return Err(LogError::invalid_argument(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(LogError::invalid_argument(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))
            .context(ctx)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(LogError::LogLocked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the record file.
    #[must_use]
    pub fn stream_path(&self) -> PathBuf {
        self.path.join(STREAM_FILE)
    }

    /// Returns the path of the import journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_FILE)
    }

    fn batch_dir(&self, batch: BatchId) -> PathBuf {
        self.path.join(STAGING_DIR).join(batch.to_string())
    }

    /// Loads the commit pointer.
    ///
    /// Returns `None` if HEAD doesn't exist (new log).
    pub fn load_head(&self, ctx: &ErrorContext) -> LogResult<Option<LogHead>> {
        match fs::read(self.head_path()) {
            Ok(data) => LogHead::decode(&data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ctx.clone().storage(e.into())),
        }
    }

    /// Saves the commit pointer atomically.
    ///
    /// Write to a temporary file, sync it, rename it over HEAD, then fsync
    /// the directory so the rename itself is durable.
    pub fn save_head(&self, head: &LogHead) -> StorageResult<()> {
        let temp_path = self.path.join(HEAD_TEMP);
        write_synced(&temp_path, &head.encode())?;
        fs::rename(&temp_path, self.head_path())?;
        sync_directory(&self.path)
    }

    /// Stores the payload at `index` of a batch.
    pub fn write_staged(&self, batch: BatchId, index: u32, payload: &[u8]) -> StorageResult<()> {
        let dir = self.batch_dir(batch);
        fs::create_dir_all(&dir)?;
        let temp_path = dir.join(format!("{index:08}.tmp"));
        write_synced(&temp_path, payload)?;
        fs::rename(&temp_path, dir.join(format!("{index:08}.rec")))?;
        Ok(())
    }

    /// Reads the payload at `index` of a batch, or `None` if it was never
    /// staged.
    pub fn read_staged(&self, batch: BatchId, index: u32) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.batch_dir(batch).join(format!("{index:08}.rec")))
    }

    /// Writes the manifest of a fully staged batch.
    pub fn write_sealed(&self, batch: BatchId, manifest: &[u8]) -> StorageResult<()> {
        let dir = self.batch_dir(batch);
        fs::create_dir_all(&dir)?;
        let temp_path = dir.join("SEALED.tmp");
        write_synced(&temp_path, manifest)?;
        fs::rename(&temp_path, dir.join(SEALED_FILE))?;
        sync_directory(&dir)
    }

    /// Reads the manifest of a batch, or `None` if it is not sealed.
    pub fn read_sealed(&self, batch: BatchId) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.batch_dir(batch).join(SEALED_FILE))
    }

    /// Removes the staging directory of a batch.
    ///
    /// Returns true if anything was removed.
    pub fn remove_staging(&self, batch: BatchId) -> StorageResult<bool> {
        match fs::remove_dir_all(self.batch_dir(batch)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Syncs a directory so renames inside it are durable.
///
/// NTFS journals metadata, so Windows needs no explicit directory fsync.
#[cfg(unix)]
fn sync_directory(path: &Path) -> StorageResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StorageResult<()> {
    Ok(())
}
