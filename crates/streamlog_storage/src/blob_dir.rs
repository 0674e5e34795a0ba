//! Directory-backed blob store.
//!
//! Emulates a cloud object store on a local or mounted filesystem:
//!
//! ```text
//! <root>/
//! ├─ .~lock                 # Advisory lock guarding version changes
//! └─ <blob name>            # version (8, LE) | contents
//! ```
//!
//! Uploads are written to a temporary sibling and renamed into place, so a
//! reader never sees a partially written blob. Version checks and renames
//! run under an in-process mutex plus an exclusive `fs2` lock on `.~lock`,
//! so conditional writes stay atomic across processes sharing the root.

use crate::blob::{validate_blob_name, Blob, BlobMeta, BlobStore, BlobVersion, PutCondition};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const LOCK_FILE: &str = ".~lock";
const TEMP_SUFFIX: &str = ".~tmp";
const VERSION_SIZE: u64 = 8;

/// A blob store persisted as files under a root directory.
#[derive(Debug)]
pub struct DirectoryBlobStore {
    root: PathBuf,
    lock_file: File,
    write_lock: Mutex<()>,
    temp_counter: AtomicU64,
}

impl DirectoryBlobStore {
    /// Opens or creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or lock file cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        Ok(Self {
            root: root.to_path_buf(),
            lock_file,
            write_lock: Mutex::new(()),
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_blob_name(name)?;
        Ok(name.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn read_version(path: &Path) -> StorageResult<Option<(File, BlobVersion, u64)>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let total = file.metadata()?.len();
        if total < VERSION_SIZE {
            return Err(StorageError::corrupted(format!(
                "blob file {} is shorter than its version header",
                path.display()
            )));
        }

        let mut header = [0u8; VERSION_SIZE as usize];
        file.read_exact(&mut header)?;
        let version = BlobVersion(u64::from_le_bytes(header));
        Ok(Some((file, version, total - VERSION_SIZE)))
    }

    fn with_exclusive<T>(&self, f: impl FnOnce() -> StorageResult<T>) -> StorageResult<T> {
        let _guard = self.write_lock.lock();
        self.lock_file.lock_exclusive()?;
        let result = f();
        let unlocked = self.lock_file.unlock();
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn write_atomically(&self, path: &Path, version: BlobVersion, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(
            "{file_name}.{}-{counter}{TEMP_SUFFIX}",
            std::process::id()
        ));

        let written = (|| -> StorageResult<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(&version.0.to_le_bytes())?;
            file.write_all(data)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, path)?;
            Ok(())
        })();

        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    fn collect_names(&self, dir: &Path, prefix: &str, names: &mut Vec<String>) -> StorageResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.contains('~') {
                continue;
            }

            let name = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };

            if entry.file_type()?.is_dir() {
                self.collect_names(&entry.path(), &name, names)?;
            } else {
                names.push(name);
            }
        }
        Ok(())
    }
}

impl BlobStore for DirectoryBlobStore {
    fn get(&self, name: &str) -> StorageResult<Option<Blob>> {
        let path = self.blob_path(name)?;
        let Some((mut file, version, len)) = Self::read_version(&path)? else {
            return Ok(None);
        };

        let mut data = Vec::with_capacity(len as usize);
        file.read_to_end(&mut data)?;
        Ok(Some(Blob { data, version }))
    }

    fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let path = self.blob_path(name)?;
        let (mut file, _, size) = Self::read_version(&path)?.ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        file.seek(SeekFrom::Start(VERSION_SIZE + offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>> {
        let path = self.blob_path(name)?;
        Ok(Self::read_version(&path)?.map(|(_, version, len)| BlobMeta { len, version }))
    }

    fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion> {
        let path = self.blob_path(name)?;

        self.with_exclusive(|| {
            let current = Self::read_version(&path)?.map(|(_, version, _)| version);
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

            let version = BlobVersion(current.map_or(1, |v| v.0 + 1));
            self.write_atomically(&path, version, data)?;
            Ok(version)
        })
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        let path = self.blob_path(name)?;
        self.with_exclusive(|| match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        self.collect_names(&self.root, "", &mut names)?;
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }
}
