//! Two-phase staged batch import.
//!
//! A batch moves through two states:
//!
//! 1. **Staged** ([`StagedBatch`]) - every payload is uploaded to the
//!    backend's staging area and the batch manifest is sealed. Nothing is
//!    visible to readers and the committed tail does not move.
//! 2. **Committed** ([`CommittedBatch`]) - the driver spliced the whole
//!    batch into the log in one atomic step.
//!
//! Staging runs in windows of `staging_window` records so the producer's
//! iterator is never fully materialized, and each window is uploaded by
//! `staging_parallelism` scoped worker threads. Import is idempotent per
//! batch, which makes retrying it safe.

use crate::batch::{BatchId, BatchManifest, StagedEntry};
use crate::config::Config;
use crate::driver::LogDriver;
use crate::error::{ErrorKind, LogError, LogResult};
use crate::offset::OffsetRange;
use crate::record::{payload_crc, RecordForStaging, RecordLimits};
use crate::retry::RetryPolicy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// A batch whose payloads are uploaded and sealed but not yet visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBatch {
    manifest: BatchManifest,
}

impl StagedBatch {
    /// Returns the batch identifier.
    #[must_use]
    pub fn id(&self) -> BatchId {
        self.manifest.batch
    }

    /// Returns the stream tag shared by every record.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.manifest.stream
    }

    /// Returns the number of staged records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.manifest.record_count()
    }

    /// Returns the log bytes the batch will occupy once committed.
    #[must_use]
    pub fn frame_bytes(&self) -> u64 {
        self.manifest.total_frame_bytes()
    }

    /// Returns the sealed manifest.
    #[must_use]
    pub fn manifest(&self) -> &BatchManifest {
        &self.manifest
    }
}

/// A batch that is part of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// The batch identifier.
    pub batch: BatchId,
    /// Stream tag shared by every record.
    pub stream: String,
    /// Contiguous range holding every record of the batch.
    pub range: OffsetRange,
    /// Number of records committed.
    pub records: usize,
    /// True if an earlier import attempt had already committed the batch.
    pub already_committed: bool,
}

/// Stages and imports batches against one driver.
#[derive(Clone)]
pub struct StagingPipeline {
    driver: Arc<dyn LogDriver>,
    config: Config,
    limits: RecordLimits,
}

impl StagingPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(driver: Arc<dyn LogDriver>, config: Config) -> Self {
        Self {
            driver,
            limits: RecordLimits::from_config(&config),
            config,
        }
    }

    /// Uploads every payload of a new batch and seals it.
    ///
    /// On any failure the partially staged batch is discarded (best
    /// effort) and the error is returned; nothing becomes visible.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] for a bad stream tag or an
    /// oversized payload, or the first upload failure.
    pub fn stage<I>(&self, stream: &str, payloads: I) -> LogResult<StagedBatch>
    where
        I: IntoIterator,
        I::Item: Into<RecordForStaging>,
    {
        self.limits.check_stream(stream)?;
        let batch = BatchId::generate();
        let mut entries = Vec::new();

        let staged = self.stage_windows(batch, payloads, &mut entries);
        let manifest = BatchManifest {
            batch,
            stream: stream.to_string(),
            entries,
        };
        let sealed = staged.and_then(|()| {
            if manifest.entries.is_empty() {
                Ok(())
            } else {
                self.driver.seal(&manifest)
            }
        });

        if let Err(e) = sealed {
            self.abandon(batch);
            return Err(e);
        }

        debug!(
            "Staged batch {batch}: {} records, {} bytes",
            manifest.record_count(),
            manifest.total_frame_bytes()
        );
        Ok(StagedBatch { manifest })
    }

    fn stage_windows<I>(
        &self,
        batch: BatchId,
        payloads: I,
        entries: &mut Vec<StagedEntry>,
    ) -> LogResult<()>
    where
        I: IntoIterator,
        I::Item: Into<RecordForStaging>,
    {
        let mut payloads = payloads.into_iter().map(Into::into);
        loop {
            let window: Vec<RecordForStaging> =
                payloads.by_ref().take(self.config.staging_window).collect();
            if window.is_empty() {
                return Ok(());
            }

            let base = u32::try_from(entries.len())
                .ok()
                .filter(|base| base.checked_add(window.len() as u32).is_some())
                .ok_or_else(|| LogError::invalid_argument("batch exceeds u32::MAX records"))?;

            for record in &window {
                self.limits.check_payload(&record.payload)?;
                entries.push(StagedEntry {
                    len: record.payload.len() as u32,
                    crc: payload_crc(&record.payload),
                });
            }
            self.upload_window(batch, base, &window)?;
        }
    }

    /// Uploads one window with scoped worker threads.
    fn upload_window(&self, batch: BatchId, base: u32, window: &[RecordForStaging]) -> LogResult<()> {
        let next = AtomicUsize::new(0);
        let failure: Mutex<Option<LogError>> = Mutex::new(None);
        let workers = self.config.staging_parallelism.clamp(1, window.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if failure.lock().is_some() {
                        return;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(record) = window.get(i) else {
                        return;
                    };
                    if let Err(e) = self.driver.stage(batch, base + i as u32, &record.payload) {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        return;
                    }
                });
            }
        });

        match failure.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Commits a staged batch, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or immediately
    /// for errors that are not transient.
    pub fn import(&self, staged: &StagedBatch) -> LogResult<CommittedBatch> {
        let batch = staged.id();
        if staged.record_count() == 0 {
            return Ok(CommittedBatch {
                batch,
                stream: staged.stream().to_string(),
                range: OffsetRange::empty_at(self.driver.tail()?),
                records: 0,
                already_committed: false,
            });
        }

        let mut retry = RetryPolicy::for_imports(&self.config).handle();
        loop {
            match self.driver.import(batch) {
                Ok(outcome) => {
                    return Ok(CommittedBatch {
                        batch,
                        stream: staged.stream().to_string(),
                        range: outcome.range(),
                        records: staged.record_count(),
                        already_committed: outcome.was_already_committed(),
                    })
                }
                Err(e) if matches!(e.kind(), ErrorKind::StorageUnavailable | ErrorKind::AmbiguousWrite) => {
                    let Some(delay) = retry.next_delay() else {
                        return Err(e);
                    };
                    warn!(
                        "Import of batch {batch} failed (attempt {}), retrying in {delay:?}: {e}",
                        retry.attempts() - 1
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stages and imports a batch in one call.
    ///
    /// # Errors
    ///
    /// Returns the staging or import error. A batch that fails to import
    /// is discarded (best effort).
    pub fn write_batch<I>(&self, stream: &str, payloads: I) -> LogResult<CommittedBatch>
    where
        I: IntoIterator,
        I::Item: Into<RecordForStaging>,
    {
        let staged = self.stage(stream, payloads)?;
        self.import(&staged).inspect_err(|_| self.abandon(staged.id()))
    }

    /// Abandons a staged batch and removes its staged data.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged data cannot be removed.
    pub fn discard(&self, staged: StagedBatch) -> LogResult<()> {
        if staged.record_count() == 0 {
            return Ok(());
        }
        self.driver.discard(staged.id())
    }

    fn abandon(&self, batch: BatchId) {
        if let Err(e) = self.driver.discard(batch) {
            warn!("Failed to discard batch {batch}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ImportOutcome;
    use crate::driver::BlobLogDriver;
    use crate::offset::StorageOffset;
    use std::sync::atomic::AtomicU32;
    use streamlog_storage::InMemoryBlobStore;

    fn driver() -> Arc<dyn LogDriver> {
        Arc::new(
            BlobLogDriver::open(Arc::new(InMemoryBlobStore::new()), "log", Config::default())
                .unwrap(),
        )
    }

    fn pipeline(driver: Arc<dyn LogDriver>) -> StagingPipeline {
        StagingPipeline::new(
            driver,
            Config::default()
                .staging_window(7)
                .staging_parallelism(3)
                .import_retry_base_delay_ms(1),
        )
    }

    /// Driver wrapper that fails selected calls.
    struct Faulty {
        inner: Arc<dyn LogDriver>,
        fail_stage_at: Option<u32>,
        import_failures: AtomicU32,
        discards: AtomicU32,
    }

    impl Faulty {
        fn new(inner: Arc<dyn LogDriver>) -> Self {
            Self {
                inner,
                fail_stage_at: None,
                import_failures: AtomicU32::new(0),
                discards: AtomicU32::new(0),
            }
        }

        fn unavailable() -> LogError {
            crate::error::ErrorContext::new(crate::error::Operation::ImportBatch)
                .storage(streamlog_storage::StorageError::unavailable("injected"))
        }
    }

    impl LogDriver for Faulty {
        fn append(&self, stream: &str, payload: &[u8]) -> LogResult<OffsetRange> {
            self.inner.append(stream, payload)
        }

        fn stage(&self, batch: BatchId, index: u32, payload: &[u8]) -> LogResult<()> {
            if self.fail_stage_at == Some(index) {
                return Err(Self::unavailable());
            }
            self.inner.stage(batch, index, payload)
        }

        fn seal(&self, manifest: &BatchManifest) -> LogResult<()> {
            self.inner.seal(manifest)
        }

        fn import(&self, batch: BatchId) -> LogResult<ImportOutcome> {
            let left = self.import_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.import_failures.store(left - 1, Ordering::SeqCst);
                return Err(Self::unavailable());
            }
            self.inner.import(batch)
        }

        fn discard(&self, batch: BatchId) -> LogResult<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            self.inner.discard(batch)
        }

        fn read_page(
            &self,
            from: StorageOffset,
            until: StorageOffset,
            max_records: usize,
        ) -> LogResult<Vec<crate::record::RetrievedRecord>> {
            self.inner.read_page(from, until, max_records)
        }

        fn tail(&self) -> LogResult<StorageOffset> {
            self.inner.tail()
        }

        fn describe(&self) -> crate::driver::DriverInfo {
            self.inner.describe()
        }
    }

    #[test]
    fn batch_lands_contiguously_in_order() {
        let driver = driver();
        let pipeline = pipeline(driver.clone());
        driver.append("single", b"before").unwrap();

        let payloads: Vec<Vec<u8>> = (0..50u32).map(|i| i.to_le_bytes().to_vec()).collect();
        let committed = pipeline.write_batch("bulk", payloads.clone()).unwrap();
        assert_eq!(committed.records, 50);
        assert!(!committed.already_committed);

        let records = driver
            .read_page(committed.range.start, committed.range.end, 100)
            .unwrap();
        let read: Vec<_> = records.iter().map(|r| r.payload.clone()).collect();
        assert_eq!(read, payloads);
        assert!(records.iter().all(|r| r.stream == "bulk"));
        assert_eq!(records.last().unwrap().next_offset, committed.range.end);
    }

    #[test]
    fn staging_does_not_move_tail() {
        let driver = driver();
        let pipeline = pipeline(driver.clone());

        let staged = pipeline.stage("bulk", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        assert_eq!(staged.record_count(), 2);
        assert_eq!(driver.tail().unwrap(), StorageOffset::ZERO);

        let committed = pipeline.import(&staged).unwrap();
        assert_eq!(committed.range.len_bytes(), staged.frame_bytes());

        let again = pipeline.import(&staged).unwrap();
        assert!(again.already_committed);
        assert_eq!(again.range, committed.range);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let driver = driver();
        let pipeline = pipeline(driver.clone());
        let tail = driver.append("s", b"x").unwrap().end;

        let committed = pipeline.write_batch("bulk", Vec::<Vec<u8>>::new()).unwrap();
        assert_eq!(committed.records, 0);
        assert_eq!(committed.range, OffsetRange::empty_at(tail));
        assert_eq!(driver.tail().unwrap(), tail);
    }

    #[test]
    fn failed_stage_abandons_batch() {
        let mut faulty = Faulty::new(driver());
        faulty.fail_stage_at = Some(9);
        let faulty = Arc::new(faulty);
        let pipeline = pipeline(faulty.clone());

        let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i]).collect();
        let err = pipeline.write_batch("bulk", payloads).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(faulty.discards.load(Ordering::SeqCst), 1);
        assert_eq!(faulty.tail().unwrap(), StorageOffset::ZERO);
    }

    #[test]
    fn transient_import_failures_are_retried() {
        let faulty = Arc::new(Faulty::new(driver()));
        faulty.import_failures.store(2, Ordering::SeqCst);
        let pipeline = pipeline(faulty.clone());

        let committed = pipeline.write_batch("bulk", vec![b"x".to_vec()]).unwrap();
        assert_eq!(committed.records, 1);
        assert_eq!(faulty.import_failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn retries_give_up_after_configured_attempts() {
        let faulty = Arc::new(Faulty::new(driver()));
        faulty.import_failures.store(10, Ordering::SeqCst);
        let pipeline = pipeline(faulty.clone());

        let err = pipeline.write_batch("bulk", vec![b"x".to_vec()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(faulty.import_failures.load(Ordering::SeqCst), 7);
        assert_eq!(faulty.tail().unwrap(), StorageOffset::ZERO);
    }

    #[test]
    fn oversized_payload_fails_fast() {
        let driver = driver();
        let pipeline = StagingPipeline::new(driver.clone(), Config::default().max_payload_size(2));

        let err = pipeline.write_batch("bulk", vec![b"ok".to_vec(), b"too big".to_vec()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(driver.tail().unwrap(), StorageOffset::ZERO);
    }
}
