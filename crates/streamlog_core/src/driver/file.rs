//! Local-filesystem log driver.
//!
//! All records live in `stream.dat` as consecutive frames, so a record's
//! offset is its byte position in that file. HEAD holds the committed tail;
//! bytes beyond it are invisible and are cut off on the next open.
//!
//! ## Commit Protocol
//!
//! Under the writer mutex:
//!
//! 1. Append the frame(s) at the committed tail (and fsync if configured)
//! 2. For imports, append the journal entry
//! 3. Replace HEAD atomically (the commit point)
//! 4. Publish the new tail to readers
//!
//! A failure before step 3 truncates the files back. If step 3 itself
//! fails, HEAD is re-read to find out whether the commit took effect.

use super::dir::LogDir;
use super::head::LogHead;
use super::index::{FrameCursor, SparseIndex};
use super::journal::ImportJournal;
use super::{BackendKind, DriverInfo, LogDriver};
use crate::batch::{BatchId, BatchManifest, ImportOutcome};
use crate::config::Config;
use crate::error::{ErrorContext, LogError, LogResult, Operation, ResultExt};
use crate::offset::{OffsetRange, StorageOffset};
use crate::record::{encode_frame, payload_crc, RecordLimits, RetrievedRecord};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use streamlog_storage::{FileBackend, StorageBackend, StorageError};
use tracing::{debug, info, warn};

struct WriterState {
    head: LogHead,
    journal: ImportJournal,
    /// Set when the files may disagree with HEAD; every later write fails.
    poisoned: bool,
}

/// A log stored in a local directory.
///
/// One process owns the directory at a time (see [`LogDir`]). Within the
/// process, commits are serialized by a mutex while reads run against the
/// published tail without taking it.
pub struct FileLogDriver {
    dir: LogDir,
    config: Config,
    limits: RecordLimits,
    stream: Arc<dyn StorageBackend>,
    writer: Mutex<WriterState>,
    committed: AtomicU64,
    index: RwLock<SparseIndex>,
}

impl FileLogDriver {
    /// Opens or creates a log rooted at `root`, recovering any commit that
    /// was interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the directory (`LogLocked`)
    /// - HEAD or the committed records fail validation (`Corrupted`)
    /// - I/O errors occur
    pub fn open(root: &Path, config: Config) -> LogResult<Self> {
        let ctx = ErrorContext::new(Operation::Open);
        config.validate()?;

        let dir = LogDir::open(root, config.create_if_missing, &ctx)?;
        let stream = Arc::new(FileBackend::open(&dir.stream_path()).context(&ctx)?);
        let journal = Arc::new(FileBackend::open(&dir.journal_path()).context(&ctx)?);
        Self::open_parts(dir, config, stream, journal)
    }

    /// Opens a log whose record and journal bytes live in the given stores.
    ///
    /// HEAD, the lock and the staging area still live under `root`. Useful
    /// for wrapping the stores with fault injection in tests.
    ///
    /// # Errors
    ///
    /// Same as [`FileLogDriver::open`].
    pub fn open_with_backends(
        root: &Path,
        config: Config,
        stream: Arc<dyn StorageBackend>,
        journal: Arc<dyn StorageBackend>,
    ) -> LogResult<Self> {
        let ctx = ErrorContext::new(Operation::Open);
        config.validate()?;

        let dir = LogDir::open(root, config.create_if_missing, &ctx)?;
        Self::open_parts(dir, config, stream, journal)
    }

    fn open_parts(
        dir: LogDir,
        config: Config,
        stream: Arc<dyn StorageBackend>,
        journal: Arc<dyn StorageBackend>,
    ) -> LogResult<Self> {
        let ctx = ErrorContext::new(Operation::Open);
        let head = dir.load_head(&ctx)?.unwrap_or_default();

        let size = stream.size().context(&ctx)?;
        if size < head.tail {
            return Err(LogError::corrupted(format!(
                "stream.dat is {size} bytes but HEAD commits {} bytes",
                head.tail
            )));
        }
        if size > head.tail {
            warn!(
                "Discarding {} uncommitted bytes past the tail of {:?}",
                size - head.tail,
                dir.path()
            );
            stream.truncate(head.tail).context(&ctx)?;
            stream.sync().context(&ctx)?;
        }

        let (journal, dropped) = ImportJournal::open(journal, head.tail).context(&ctx)?;
        if dropped > 0 {
            warn!("Dropped {dropped} journal entries of unpublished imports");
        }

        let mut index = SparseIndex::new(config.index_stride);
        let mut records = 0u64;
        let mut cursor = FrameCursor::new(
            stream.as_ref(),
            0,
            head.tail,
            config.verify_on_open,
            ctx.clone(),
        );
        while let Some((offset, _)) = cursor.next_frame()? {
            index.observe(offset);
            records += 1;
        }

        info!(
            "Opened log at {:?}: tail {}, {} commits, {} records, {} imports",
            dir.path(),
            head.tail,
            head.commits,
            records,
            journal.len()
        );

        Ok(Self {
            dir,
            limits: RecordLimits::from_config(&config),
            config,
            stream,
            committed: AtomicU64::new(head.tail),
            writer: Mutex::new(WriterState {
                head,
                journal,
                poisoned: false,
            }),
            index: RwLock::new(index),
        })
    }

    /// Returns the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the number of commits published so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.writer.lock().head.commits
    }

    fn lock_writer(&self, ctx: &ErrorContext) -> LogResult<MutexGuard<'_, WriterState>> {
        let state = self.writer.lock();
        if state.poisoned {
            return Err(ctx.clone().storage(StorageError::unavailable(
                "log writer is poisoned by an unresolved commit; reopen the log",
            )));
        }
        Ok(state)
    }

    /// Appends one frame at the committed tail.
    fn write_frame(&self, expected: u64, frame: &[u8], ctx: &ErrorContext) -> LogResult<()> {
        let at = self.stream.append(frame).context(ctx)?;
        if at != expected {
            return Err(ctx.clone().storage(StorageError::corrupted(format!(
                "stream.dat grew to {at} bytes outside the commit protocol (tail {expected})"
            ))));
        }
        Ok(())
    }

    /// Copies the staged payloads of a batch into the stream as frames.
    ///
    /// Returns the start offset of every frame written.
    fn copy_staged(
        &self,
        manifest: &BatchManifest,
        start: u64,
        ctx: &ErrorContext,
    ) -> LogResult<Vec<u64>> {
        let mut starts = Vec::with_capacity(manifest.entries.len());
        let mut pos = start;

        for (index, entry) in manifest.entries.iter().enumerate() {
            let index = index as u32;
            let payload = self
                .dir
                .read_staged(manifest.batch, index)
                .context(ctx)?
                .ok_or_else(|| {
                    LogError::incomplete_batch(manifest.batch, format!("record {index} is missing"))
                })?;
            if payload.len() != entry.len as usize || payload_crc(&payload) != entry.crc {
                return Err(LogError::incomplete_batch(
                    manifest.batch,
                    format!("record {index} does not match the sealed manifest"),
                ));
            }

            let frame = encode_frame(&manifest.stream, &payload)?;
            self.write_frame(pos, &frame, ctx)?;
            starts.push(pos);
            pos += frame.len() as u64;
        }
        Ok(starts)
    }

    fn sync_stream(&self, ctx: &ErrorContext) -> LogResult<()> {
        if self.config.sync_on_commit {
            self.stream.sync().context(ctx)?;
        }
        Ok(())
    }

    /// Truncates everything written since the committed tail.
    fn rollback(&self, state: &mut WriterState, tail: u64) {
        let result = self
            .stream
            .truncate(tail)
            .and_then(|()| state.journal.rollback());

        if let Err(e) = result {
            warn!("Rollback to tail {tail} failed, poisoning writer: {e}");
            state.poisoned = true;
        }
    }

    /// Makes a written commit durable and visible.
    fn publish(
        &self,
        state: &mut WriterState,
        range: OffsetRange,
        batch: Option<BatchId>,
        starts: &[u64],
        ctx: &ErrorContext,
    ) -> LogResult<()> {
        let new_head = state.head.advanced(range.end.as_u64());

        if let Err(e) = self.dir.save_head(&new_head) {
            match self.dir.load_head(ctx) {
                Ok(Some(current)) if current == new_head => {
                    warn!("HEAD publish reported an error but HEAD is current: {e}");
                }
                Ok(current) if current.unwrap_or_default() == state.head => {
                    self.rollback(state, range.start.as_u64());
                    return Err(ctx.clone().storage(e));
                }
                _ => {
                    state.poisoned = true;
                    return Err(ctx.clone().ambiguous(
                        "HEAD publish failed and HEAD could not be re-read",
                        Some(e),
                    ));
                }
            }
        }

        state.head = new_head;
        if let Some(batch) = batch {
            state.journal.record(batch, range);
        }
        {
            let mut index = self.index.write();
            for &start in starts {
                index.observe(start);
            }
        }
        self.committed.store(range.end.as_u64(), Ordering::Release);

        debug!(
            "Committed {} record(s) at {range} (commit {})",
            starts.len(),
            new_head.commits
        );
        Ok(())
    }

    fn load_manifest(&self, batch: BatchId, ctx: &ErrorContext) -> LogResult<BatchManifest> {
        let data = self
            .dir
            .read_sealed(batch)
            .context(ctx)?
            .ok_or_else(|| LogError::incomplete_batch(batch, "batch is not sealed"))?;
        let manifest = BatchManifest::decode(&data)?;
        if manifest.batch != batch {
            return Err(LogError::corrupted(format!(
                "staging directory of batch {batch} holds the manifest of {}",
                manifest.batch
            )));
        }
        Ok(manifest)
    }

    fn remove_staging(&self, batch: BatchId) {
        if let Err(e) = self.dir.remove_staging(batch) {
            warn!("Failed to remove staged files of batch {batch}: {e}");
        }
    }
}

impl LogDriver for FileLogDriver {
    fn append(&self, stream: &str, payload: &[u8]) -> LogResult<OffsetRange> {
        self.limits.check_stream(stream)?;
        self.limits.check_payload(payload)?;
        let frame = encode_frame(stream, payload)?;

        let mut ctx = ErrorContext::new(Operation::WriteEvent).with_stream(stream);
        let mut state = self.lock_writer(&ctx)?;
        let start = state.head.tail;
        ctx = ctx.with_offset(StorageOffset::from_bytes(start));

        let written = self
            .write_frame(start, &frame, &ctx)
            .and_then(|()| self.sync_stream(&ctx));
        if let Err(e) = written {
            self.rollback(&mut state, start);
            return Err(e);
        }

        let range = OffsetRange::new(start, start + frame.len() as u64);
        self.publish(&mut state, range, None, &[start], &ctx)?;
        Ok(range)
    }

    fn stage(&self, batch: BatchId, index: u32, payload: &[u8]) -> LogResult<()> {
        self.limits.check_payload(payload)?;
        let ctx = ErrorContext::new(Operation::StageBatch).with_batch(batch);
        self.dir.write_staged(batch, index, payload).context(&ctx)
    }

    fn seal(&self, manifest: &BatchManifest) -> LogResult<()> {
        self.limits.check_stream(&manifest.stream)?;
        let ctx = ErrorContext::new(Operation::SealBatch)
            .with_batch(manifest.batch)
            .with_stream(&manifest.stream);
        self.dir
            .write_sealed(manifest.batch, &manifest.encode()?)
            .context(&ctx)
    }

    fn import(&self, batch: BatchId) -> LogResult<ImportOutcome> {
        let mut ctx = ErrorContext::new(Operation::ImportBatch).with_batch(batch);
        let mut state = self.lock_writer(&ctx)?;

        if let Some(range) = state.journal.get(batch) {
            drop(state);
            debug!("Batch {batch} was already committed at {range}");
            self.remove_staging(batch);
            return Ok(ImportOutcome::AlreadyCommitted(range));
        }

        let manifest = self.load_manifest(batch, &ctx)?;
        let start = state.head.tail;
        ctx = ctx
            .with_stream(&manifest.stream)
            .with_offset(StorageOffset::from_bytes(start));
        let range = OffsetRange::new(start, start + manifest.total_frame_bytes());

        let written = self
            .copy_staged(&manifest, start, &ctx)
            .and_then(|starts| {
                self.sync_stream(&ctx)?;
                state
                    .journal
                    .append(batch, range, self.config.sync_on_commit)
                    .context(&ctx)?;
                Ok(starts)
            });
        let starts = match written {
            Ok(starts) => starts,
            Err(e) => {
                self.rollback(&mut state, start);
                return Err(e);
            }
        };

        self.publish(&mut state, range, Some(batch), &starts, &ctx)?;
        drop(state);

        self.remove_staging(batch);
        Ok(ImportOutcome::Committed(range))
    }

    fn discard(&self, batch: BatchId) -> LogResult<()> {
        let ctx = ErrorContext::new(Operation::DiscardBatch).with_batch(batch);
        self.dir.remove_staging(batch).context(&ctx)?;
        Ok(())
    }

    fn read_page(
        &self,
        from: StorageOffset,
        until: StorageOffset,
        max_records: usize,
    ) -> LogResult<Vec<RetrievedRecord>> {
        let tail = self.committed.load(Ordering::Acquire);
        let until = until.as_u64().min(tail);
        let from_bytes = from.as_u64();
        if from_bytes >= until || max_records == 0 {
            return Ok(Vec::new());
        }

        let ctx = ErrorContext::new(Operation::ReadEvents).with_offset(from);
        let start = self.index.read().seek(from_bytes);
        let mut cursor = FrameCursor::new(self.stream.as_ref(), start, until, true, ctx);

        let mut records = Vec::new();
        loop {
            let (offset, frame) = match cursor.next_frame() {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) if records.is_empty() => return Err(e),
                Err(e) => {
                    debug!("Cutting page short after {} records: {e}", records.len());
                    break;
                }
            };
            if offset < from_bytes {
                continue;
            }
            records.push(frame.into_record(StorageOffset::from_bytes(offset)));
            if records.len() == max_records {
                break;
            }
        }
        Ok(records)
    }

    fn tail(&self) -> LogResult<StorageOffset> {
        Ok(StorageOffset::from_bytes(
            self.committed.load(Ordering::Acquire),
        ))
    }

    fn describe(&self) -> DriverInfo {
        DriverInfo {
            kind: BackendKind::Files,
            location: self.dir.path().display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::StagedEntry;
    use crate::error::ErrorKind;
    use crate::record::frame_len;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use streamlog_storage::{InMemoryBackend, StorageResult};
    use tempfile::tempdir;

    fn open(path: &Path) -> FileLogDriver {
        FileLogDriver::open(path, Config::default().index_stride(64)).unwrap()
    }

    fn stage_batch(driver: &FileLogDriver, stream: &str, payloads: &[&[u8]]) -> BatchId {
        let batch = BatchId::generate();
        for (i, payload) in payloads.iter().enumerate() {
            driver.stage(batch, i as u32, payload).unwrap();
        }
        driver
            .seal(&BatchManifest {
                batch,
                stream: stream.to_string(),
                entries: payloads
                    .iter()
                    .map(|p| StagedEntry {
                        len: p.len() as u32,
                        crc: payload_crc(p),
                    })
                    .collect(),
            })
            .unwrap();
        batch
    }

    /// Byte store whose appends fail on demand.
    #[derive(Default)]
    struct FlakyBackend {
        inner: InMemoryBackend,
        fail_appends: AtomicBool,
    }

    impl StorageBackend for FlakyBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            if self.fail_appends.load(Ordering::SeqCst) {
                // Leave a partial write behind, as a crashed disk would.
                self.inner.append(&data[..data.len() / 2])?;
                return Err(StorageError::unavailable("injected append failure"));
            }
            self.inner.append(data)
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&self) -> StorageResult<()> {
            Ok(())
        }

        fn truncate(&self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn appends_get_increasing_offsets() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());

        let a = driver.append("orders", b"first").unwrap();
        let b = driver.append("users", b"second").unwrap();
        assert_eq!(a.start, StorageOffset::ZERO);
        assert_eq!(a.end, b.start);
        assert_eq!(driver.tail().unwrap(), b.end);
        assert_eq!(driver.commit_count(), 2);

        let records = driver
            .read_page(StorageOffset::ZERO, b.end, 10)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].stream, "users");
        assert_eq!(records[1].offset, b.start);
        assert_eq!(records[1].next_offset, b.end);
    }

    #[test]
    fn log_survives_reopen() {
        let temp = tempdir().unwrap();
        let tail = {
            let driver = open(temp.path());
            for i in 0..50u32 {
                driver.append("s", &i.to_le_bytes()).unwrap();
            }
            driver.tail().unwrap()
        };

        let driver = open(temp.path());
        assert_eq!(driver.tail().unwrap(), tail);
        let records = driver.read_page(StorageOffset::ZERO, tail, 100).unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[49].payload, 49u32.to_le_bytes());
    }

    #[test]
    fn uncommitted_bytes_are_discarded_on_open() {
        let temp = tempdir().unwrap();
        let tail = {
            let driver = open(temp.path());
            driver.append("s", b"committed").unwrap();
            driver.tail().unwrap()
        };

        let mut file = OpenOptions::new()
            .append(true)
            .open(temp.path().join("stream.dat"))
            .unwrap();
        file.write_all(&encode_frame("s", b"never published").unwrap())
            .unwrap();
        drop(file);

        let driver = open(temp.path());
        assert_eq!(driver.tail().unwrap(), tail);
        let next = driver.append("s", b"after recovery").unwrap();
        assert_eq!(next.start, tail);
    }

    #[test]
    fn read_from_mid_record_offset_skips_partial_record() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());
        let ranges: Vec<_> = (0..20u8)
            .map(|i| driver.append("s", &[i; 10]).unwrap())
            .collect();

        let inside = ranges[7].start.advance(3);
        let records = driver.read_page(inside, driver.tail().unwrap(), 100).unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].offset, ranges[8].start);

        let records = driver.read_page(ranges[7].start, driver.tail().unwrap(), 1).unwrap();
        assert_eq!(records[0].payload, vec![7; 10]);
    }

    #[test]
    fn import_commits_batch_contiguously() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());
        driver.append("single", b"before").unwrap();
        let before = driver.tail().unwrap();

        let batch = stage_batch(&driver, "bulk", &[b"a", b"bb", b"ccc"]);
        let outcome = driver.import(batch).unwrap();
        let range = outcome.range();
        assert!(!outcome.was_already_committed());
        assert_eq!(range.start, before);
        assert_eq!(range.len_bytes(), frame_len(4, 1) + frame_len(4, 2) + frame_len(4, 3));

        let records = driver.read_page(range.start, range.end, 10).unwrap();
        let payloads: Vec<_> = records.iter().map(|r| r.payload.clone()).collect();
        assert_eq!(payloads, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
        assert!(records.iter().all(|r| r.stream == "bulk"));
        assert!(!temp.path().join("staging").join(batch.to_string()).exists());
    }

    #[test]
    fn reimport_is_idempotent_across_reopen() {
        let temp = tempdir().unwrap();
        let (batch, range) = {
            let driver = open(temp.path());
            let batch = stage_batch(&driver, "bulk", &[b"x", b"y"]);
            (batch, driver.import(batch).unwrap().range())
        };

        let driver = open(temp.path());
        assert_eq!(
            driver.import(batch).unwrap(),
            ImportOutcome::AlreadyCommitted(range)
        );
        assert_eq!(driver.tail().unwrap(), range.end);
    }

    #[test]
    fn unsealed_batch_is_incomplete() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());
        let batch = BatchId::generate();
        driver.stage(batch, 0, b"lonely").unwrap();

        let err = driver.import(batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteBatch);
        assert_eq!(driver.tail().unwrap(), StorageOffset::ZERO);
    }

    #[test]
    fn missing_staged_record_rolls_back_import() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());
        driver.append("s", b"kept").unwrap();
        let tail = driver.tail().unwrap();

        let batch = BatchId::generate();
        driver.stage(batch, 0, b"present").unwrap();
        driver
            .seal(&BatchManifest {
                batch,
                stream: "s".to_string(),
                entries: vec![
                    StagedEntry {
                        len: 7,
                        crc: payload_crc(b"present"),
                    },
                    StagedEntry { len: 4, crc: 0 },
                ],
            })
            .unwrap();

        let err = driver.import(batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteBatch);
        assert_eq!(driver.tail().unwrap(), tail);
        assert_eq!(
            std::fs::metadata(temp.path().join("stream.dat")).unwrap().len(),
            tail.as_u64()
        );
        assert_eq!(driver.append("s", b"next").unwrap().start, tail);
    }

    #[test]
    fn failed_append_leaves_tail_untouched() {
        let temp = tempdir().unwrap();
        let ctx = ErrorContext::new(Operation::Open);
        let dir = LogDir::open(temp.path(), true, &ctx).unwrap();
        let stream = Arc::new(FlakyBackend::default());
        let driver = FileLogDriver::open_parts(
            dir,
            Config::default(),
            stream.clone(),
            Arc::new(InMemoryBackend::new()),
        )
        .unwrap();

        let first = driver.append("s", b"one").unwrap();
        stream.fail_appends.store(true, Ordering::SeqCst);
        let err = driver.append("s", b"two").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(driver.tail().unwrap(), first.end);

        stream.fail_appends.store(false, Ordering::SeqCst);
        let retried = driver.append("s", b"two").unwrap();
        assert_eq!(retried.start, first.end);
        assert_eq!(
            driver.read_page(StorageOffset::ZERO, retried.end, 10).unwrap().len(),
            2
        );
    }

    /// Real byte store whose failing appends leave bytes it never counted,
    /// like a `write_all` cut short by a full disk.
    struct TornFile {
        inner: FileBackend,
        path: std::path::PathBuf,
        tear: AtomicBool,
    }

    impl StorageBackend for TornFile {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            if self.tear.load(Ordering::SeqCst) {
                let mut file = OpenOptions::new().append(true).open(&self.path)?;
                file.write_all(&data[..data.len() / 2])?;
                return Err(StorageError::Io(std::io::Error::other("file too large")));
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

    #[test]
    fn torn_append_on_disk_is_cut_before_next_commit() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stream.dat");
        let stream = Arc::new(TornFile {
            inner: FileBackend::open(&path).unwrap(),
            path: path.clone(),
            tear: AtomicBool::new(false),
        });
        let journal = Arc::new(FileBackend::open(&temp.path().join("imports.log")).unwrap());
        let driver =
            FileLogDriver::open_with_backends(temp.path(), Config::default(), stream.clone(), journal)
                .unwrap();

        let first = driver.append("s", &[1u8; 1000]).unwrap();
        stream.tear.store(true, Ordering::SeqCst);
        assert!(driver.append("s", &[2u8; 1000]).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first.end.as_u64());

        stream.tear.store(false, Ordering::SeqCst);
        let third = driver.append("s", &[3u8; 1000]).unwrap();
        assert_eq!(third.start, first.end);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), third.end.as_u64());

        let records = driver.read_page(StorageOffset::ZERO, third.end, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, vec![3u8; 1000]);
    }

    #[test]
    fn invalid_input_fails_fast() {
        let temp = tempdir().unwrap();
        let driver =
            FileLogDriver::open(temp.path(), Config::default().max_payload_size(4)).unwrap();

        assert_eq!(
            driver.append("", b"x").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            driver.append("s", b"too big").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(driver.tail().unwrap(), StorageOffset::ZERO);
    }

    #[test]
    fn describe_names_directory() {
        let temp = tempdir().unwrap();
        let driver = open(temp.path());
        let info = driver.describe();
        assert_eq!(info.kind, BackendKind::Files);
        assert_eq!(info.location, temp.path().display().to_string());
    }
}
