//! Cloud-blob log driver.
//!
//! Commits are published by swapping the head pointer from one version to
//! the next with a conditional put. Any number of processes may share a
//! container: a writer that loses the race deletes its orphan descriptor,
//! reloads the head and tries again.

use super::segment::{
    from_cbor, to_cbor, BlobLayout, ChainCache, HeadPointer, SegmentBody, SegmentDescriptor,
};
use super::{BackendKind, DriverInfo, LogDriver};
use crate::batch::{BatchId, BatchManifest, ImportOutcome};
use crate::config::Config;
use crate::error::{ErrorContext, LogError, LogResult, Operation, ResultExt};
use crate::offset::{OffsetRange, StorageOffset};
use crate::record::{decode_frame, encode_frame, frame_len, payload_crc, RecordLimits, RetrievedRecord};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use streamlog_storage::{BlobStore, BlobVersion, PutCondition, StorageError};
use tracing::{debug, info, warn};

/// A log stored in a cloud-style blob container.
pub struct BlobLogDriver {
    store: Arc<dyn BlobStore>,
    layout: BlobLayout,
    config: Config,
    limits: RecordLimits,
    commit_lock: Mutex<()>,
    chain: RwLock<ChainCache>,
}

impl BlobLogDriver {
    /// Opens the log in `container`, validating its descriptor chain.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The container name is invalid
    /// - The log doesn't exist and `create_if_missing` is false
    /// - The descriptor chain is broken (`Corrupted`)
    pub fn open(store: Arc<dyn BlobStore>, container: &str, config: Config) -> LogResult<Self> {
        config.validate()?;
        if container.is_empty() || container.contains('/') {
            return Err(LogError::invalid_argument(format!(
                "invalid container name '{container}'"
            )));
        }

        let driver = Self {
            store,
            layout: BlobLayout::new(container),
            limits: RecordLimits::from_config(&config),
            config,
            commit_lock: Mutex::new(()),
            chain: RwLock::new(ChainCache::default()),
        };

        let ctx = ErrorContext::new(Operation::Open);
        let (head, version) = driver.load_head(&ctx)?;
        if version.is_none() && !driver.config.create_if_missing {
            return Err(LogError::invalid_argument(format!(
                "no log in container '{container}'"
            )));
        }
        driver.sync_chain(&head, &ctx)?;

        info!(
            "Opened blob log in container '{container}': tail {}, {} commits, {} imports",
            head.tail,
            head.seq,
            driver.chain.read().batch_count()
        );
        Ok(driver)
    }

    /// Returns the container name.
    #[must_use]
    pub fn container(&self) -> &str {
        self.layout.container()
    }

    /// Returns the number of commits published so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the head cannot be read.
    pub fn commit_count(&self) -> LogResult<u64> {
        let (head, _) = self.load_head(&ErrorContext::new(Operation::ReadTail))?;
        Ok(head.seq)
    }

    fn load_head(&self, ctx: &ErrorContext) -> LogResult<(HeadPointer, Option<BlobVersion>)> {
        let name = self.layout.head();
        match self.store.get(&name).context(ctx)? {
            Some(blob) => Ok((from_cbor(&blob.data, &name)?, Some(blob.version))),
            None => Ok((HeadPointer::default(), None)),
        }
    }

    /// Brings the chain cache up to `head`.
    fn sync_chain(&self, head: &HeadPointer, ctx: &ErrorContext) -> LogResult<()> {
        let known = {
            let chain = self.chain.read();
            if chain.covers(head) {
                return Ok(());
            }
            chain.latest_seq()
        };

        let mut fetched = Vec::new();
        let mut next = head.latest.clone();
        while let Some(name) = next {
            let blob = self.store.get(&name).context(ctx)?.ok_or_else(|| {
                LogError::corrupted(format!("committed descriptor {name} is missing"))
            })?;
            let descriptor: SegmentDescriptor = from_cbor(&blob.data, &name)?;
            let reached_cache = descriptor.seq <= known + 1;
            next = descriptor.prev.clone();
            fetched.push((name, descriptor));
            if reached_cache {
                break;
            }
        }

        self.chain.write().extend(head, fetched)
    }

    fn delete_best_effort(&self, name: &str) {
        if let Err(e) = self.store.delete(name) {
            warn!("Failed to delete orphan blob {name}: {e}");
        }
    }

    /// Publishes one commit of `len` bytes.
    ///
    /// For imports, an already committed batch short-circuits with its
    /// original range.
    fn commit(
        &self,
        body: SegmentBody,
        len: u64,
        batch: Option<BatchId>,
        ctx: &ErrorContext,
    ) -> LogResult<ImportOutcome> {
        let _guard = self.commit_lock.lock();
        let head_name = self.layout.head();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let (head, version) = self.load_head(ctx)?;
            self.sync_chain(&head, ctx)?;
            if let Some(range) = batch.and_then(|b| self.chain.read().batch(b)) {
                return Ok(ImportOutcome::AlreadyCommitted(range));
            }

            let range = OffsetRange::new(head.tail, head.tail + len);
            let name = self.layout.new_segment(head.seq + 1);
            let descriptor = SegmentDescriptor {
                seq: head.seq + 1,
                start: range.start.as_u64(),
                end: range.end.as_u64(),
                prev: head.latest.clone(),
                body: body.clone(),
            };
            self.store
                .put(&name, &to_cbor(&descriptor)?, PutCondition::IfAbsent)
                .context(ctx)?;

            let new_head = HeadPointer {
                seq: descriptor.seq,
                tail: descriptor.end,
                latest: Some(name.clone()),
            };
            let condition = version.map_or(PutCondition::IfAbsent, PutCondition::IfMatch);

            match self.store.put(&head_name, &to_cbor(&new_head)?, condition) {
                Ok(_) => {}
                Err(e) if e.is_precondition_failed() => {
                    self.delete_best_effort(&name);
                    if attempts >= self.config.max_commit_attempts {
                        return Err(ctx.clone().storage(StorageError::unavailable(format!(
                            "lost the head race {attempts} times"
                        ))));
                    }
                    debug!("Lost head race at seq {}, retrying", descriptor.seq);
                    continue;
                }
                Err(e) => match self.publish_took_effect(descriptor.seq, &name, ctx) {
                    Ok(true) => {
                        warn!("Head publish reported an error but took effect: {e}");
                    }
                    Ok(false) => {
                        self.delete_best_effort(&name);
                        return Err(ctx.clone().storage(e));
                    }
                    Err(_) => {
                        return Err(ctx.clone().ambiguous(
                            format!("head publish for seq {} failed and the head could not be re-read", descriptor.seq),
                            Some(e),
                        ))
                    }
                },
            }

            self.chain.write().insert(name, descriptor);
            debug!("Committed seq {} at {range}", new_head.seq);
            return Ok(ImportOutcome::Committed(range));
        }
    }

    /// Re-reads the chain after a failed head put to learn whether
    /// descriptor `name` became commit `seq`.
    ///
    /// Other writers may already have committed on top of it, so the head
    /// alone is not enough.
    fn publish_took_effect(&self, seq: u64, name: &str, ctx: &ErrorContext) -> LogResult<bool> {
        let (current, _) = self.load_head(ctx)?;
        if current.seq < seq {
            return Ok(false);
        }
        self.sync_chain(&current, ctx)?;
        Ok(self.chain.read().name_at(seq) == Some(name))
    }

    fn load_manifest(&self, batch: BatchId, ctx: &ErrorContext) -> LogResult<BatchManifest> {
        let name = self.layout.sealed(batch);
        let blob = self
            .store
            .get(&name)
            .context(ctx)?
            .ok_or_else(|| LogError::incomplete_batch(batch, "batch is not sealed"))?;
        let manifest = BatchManifest::decode(&blob.data)?;
        if manifest.batch != batch {
            return Err(LogError::corrupted(format!(
                "{name} holds the manifest of batch {}",
                manifest.batch
            )));
        }
        Ok(manifest)
    }

    fn read_segment(
        &self,
        segment: &SegmentDescriptor,
        from: u64,
        until: u64,
        limit: usize,
        out: &mut Vec<RetrievedRecord>,
        ctx: &ErrorContext,
    ) -> LogResult<()> {
        match &segment.body {
            SegmentBody::Inline { chunk, .. } => {
                let data = self
                    .store
                    .get(chunk)
                    .context(ctx)?
                    .ok_or_else(|| LogError::corrupted(format!("committed chunk {chunk} is missing")))?
                    .data;
                let mut pos = 0usize;
                let mut offset = segment.start;
                while offset < segment.end && offset < until && out.len() < limit {
                    let frame = decode_frame(&data[pos..], true)?.ok_or_else(|| {
                        LogError::corrupted(format!("chunk {chunk} is truncated at offset {offset}"))
                    })?;
                    let len = frame.frame_len;
                    if offset >= from {
                        out.push(frame.into_record(StorageOffset::from_bytes(offset)));
                    }
                    pos += len as usize;
                    offset += len;
                }
            }
            SegmentBody::Imported {
                batch,
                stream,
                entries,
            } => {
                let mut offset = segment.start;
                for (index, entry) in entries.iter().enumerate() {
                    if offset >= until || out.len() >= limit {
                        break;
                    }
                    let len = frame_len(stream.len(), entry.len as usize);
                    if offset >= from {
                        let name = self.layout.staged(*batch, index as u32);
                        let payload = self
                            .store
                            .get(&name)
                            .context(ctx)?
                            .ok_or_else(|| {
                                LogError::corrupted(format!("committed payload {name} is missing"))
                            })?
                            .data;
                        if payload.len() != entry.len as usize || payload_crc(&payload) != entry.crc {
                            return Err(LogError::corrupted(format!(
                                "committed payload {name} does not match its checksum"
                            )));
                        }
                        out.push(RetrievedRecord {
                            stream: stream.clone(),
                            payload,
                            offset: StorageOffset::from_bytes(offset),
                            next_offset: StorageOffset::from_bytes(offset + len),
                        });
                    }
                    offset += len;
                }
            }
        }
        Ok(())
    }
}

impl LogDriver for BlobLogDriver {
    fn append(&self, stream: &str, payload: &[u8]) -> LogResult<OffsetRange> {
        self.limits.check_stream(stream)?;
        self.limits.check_payload(payload)?;
        let frame = encode_frame(stream, payload)?;
        let ctx = ErrorContext::new(Operation::WriteEvent).with_stream(stream);

        let chunk = self.layout.new_chunk();
        self.store
            .put(&chunk, &frame, PutCondition::IfAbsent)
            .context(&ctx)?;

        let body = SegmentBody::Inline {
            chunk: chunk.clone(),
            records: 1,
        };
        match self.commit(body, frame.len() as u64, None, &ctx) {
            Ok(outcome) => Ok(outcome.range()),
            Err(e) => {
                if !matches!(e, LogError::AmbiguousWrite { .. }) {
                    self.delete_best_effort(&chunk);
                }
                Err(e)
            }
        }
    }

    fn stage(&self, batch: BatchId, index: u32, payload: &[u8]) -> LogResult<()> {
        self.limits.check_payload(payload)?;
        let ctx = ErrorContext::new(Operation::StageBatch).with_batch(batch);
        match self
            .store
            .put(&self.layout.staged(batch, index), payload, PutCondition::IfAbsent)
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_precondition_failed() => Err(LogError::invalid_argument(format!(
                "record {index} of batch {batch} is already staged"
            ))),
            Err(e) => Err(ctx.storage(e)),
        }
    }

    fn seal(&self, manifest: &BatchManifest) -> LogResult<()> {
        self.limits.check_stream(&manifest.stream)?;
        let ctx = ErrorContext::new(Operation::SealBatch)
            .with_batch(manifest.batch)
            .with_stream(&manifest.stream);
        self.store
            .put(
                &self.layout.sealed(manifest.batch),
                &manifest.encode()?,
                PutCondition::Always,
            )
            .context(&ctx)?;
        Ok(())
    }

    fn import(&self, batch: BatchId) -> LogResult<ImportOutcome> {
        let mut ctx = ErrorContext::new(Operation::ImportBatch).with_batch(batch);

        let (head, _) = self.load_head(&ctx)?;
        self.sync_chain(&head, &ctx)?;
        if let Some(range) = self.chain.read().batch(batch) {
            debug!("Batch {batch} was already committed at {range}");
            return Ok(ImportOutcome::AlreadyCommitted(range));
        }

        let manifest = self.load_manifest(batch, &ctx)?;
        ctx = ctx.with_stream(&manifest.stream);
        for (index, entry) in manifest.entries.iter().enumerate() {
            let name = self.layout.staged(batch, index as u32);
            match self.store.head(&name).context(&ctx)? {
                Some(meta) if meta.len == u64::from(entry.len) => {}
                Some(_) => {
                    return Err(LogError::incomplete_batch(
                        batch,
                        format!("record {index} does not match the sealed manifest"),
                    ))
                }
                None => {
                    return Err(LogError::incomplete_batch(
                        batch,
                        format!("record {index} is missing"),
                    ))
                }
            }
        }

        let body = SegmentBody::Imported {
            batch,
            stream: manifest.stream.clone(),
            entries: manifest.entries.clone(),
        };
        self.commit(body, manifest.total_frame_bytes(), Some(batch), &ctx)
    }

    fn discard(&self, batch: BatchId) -> LogResult<()> {
        let ctx = ErrorContext::new(Operation::DiscardBatch).with_batch(batch);
        let _guard = self.commit_lock.lock();

        let (head, _) = self.load_head(&ctx)?;
        self.sync_chain(&head, &ctx)?;
        if self.chain.read().batch(batch).is_some() {
            debug!("Batch {batch} is committed; its staged payloads stay");
            return Ok(());
        }

        for name in self.store.list(&self.layout.staging_prefix(batch)).context(&ctx)? {
            self.store.delete(&name).context(&ctx)?;
        }
        Ok(())
    }

    fn read_page(
        &self,
        from: StorageOffset,
        until: StorageOffset,
        max_records: usize,
    ) -> LogResult<Vec<RetrievedRecord>> {
        let ctx = ErrorContext::new(Operation::ReadEvents).with_offset(from);
        let (head, _) = self.load_head(&ctx)?;
        self.sync_chain(&head, &ctx)?;

        let from = from.as_u64();
        let until = until.as_u64().min(head.tail);
        let mut records = Vec::new();
        if max_records == 0 {
            return Ok(records);
        }

        let segments = self.chain.read().segments(from, until);
        for segment in segments {
            if let Err(e) = self.read_segment(&segment, from, until, max_records, &mut records, &ctx) {
                if records.is_empty() {
                    return Err(e);
                }
                debug!("Cutting page short after {} records: {e}", records.len());
                break;
            }
            if records.len() >= max_records {
                break;
            }
        }
        Ok(records)
    }

    fn tail(&self) -> LogResult<StorageOffset> {
        let (head, _) = self.load_head(&ErrorContext::new(Operation::ReadTail))?;
        Ok(StorageOffset::from_bytes(head.tail))
    }

    fn describe(&self) -> DriverInfo {
        DriverInfo {
            kind: BackendKind::Blob,
            location: self.layout.container().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::StagedEntry;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread;
    use streamlog_storage::{Blob, BlobMeta, InMemoryBlobStore, StorageResult};

    fn open(store: &Arc<InMemoryBlobStore>) -> BlobLogDriver {
        BlobLogDriver::open(store.clone(), "log", Config::default()).unwrap()
    }

    fn seal(driver: &BlobLogDriver, stream: &str, payloads: &[&[u8]]) -> BatchId {
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

    /// Blob store whose head writes fail a set number of times.
    struct FailingHeadStore {
        inner: InMemoryBlobStore,
        head_failures: AtomicU32,
        fail_rereads: bool,
    }

    impl BlobStore for FailingHeadStore {
        fn get(&self, name: &str) -> StorageResult<Option<Blob>> {
            if self.fail_rereads
                && name.ends_with("/head")
                && self.head_failures.load(Ordering::SeqCst) == 0
            {
                return Err(StorageError::unavailable("injected read failure"));
            }
            self.inner.get(name)
        }

        fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.get_range(name, offset, len)
        }

        fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>> {
            self.inner.head(name)
        }

        fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion> {
            if name.ends_with("/head") {
                let left = self.head_failures.load(Ordering::SeqCst);
                if left > 0 {
                    self.head_failures.store(left - 1, Ordering::SeqCst);
                    return Err(StorageError::unavailable("injected head failure"));
                }
            }
            self.inner.put(name, data, condition)
        }

        fn delete(&self, name: &str) -> StorageResult<bool> {
            self.inner.delete(name)
        }

        fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.list(prefix)
        }
    }

    #[test]
    fn appends_chain_through_head() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);

        let a = driver.append("orders", b"one").unwrap();
        let b = driver.append("orders", b"two").unwrap();
        assert_eq!(a.start, StorageOffset::ZERO);
        assert_eq!(b.start, a.end);
        assert_eq!(driver.tail().unwrap(), b.end);
        assert_eq!(driver.commit_count().unwrap(), 2);

        let records = driver.read_page(StorageOffset::ZERO, b.end, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, b"two");
        assert_eq!(records[1].next_offset, b.end);
    }

    #[test]
    fn second_driver_sees_first_drivers_commits() {
        let store = Arc::new(InMemoryBlobStore::new());
        let writer = open(&store);
        let reader = open(&store);

        writer.append("s", b"x").unwrap();
        let batch = seal(&writer, "bulk", &[b"a", b"b"]);
        let range = writer.import(batch).unwrap().range();

        assert_eq!(reader.tail().unwrap(), range.end);
        let records = reader.read_page(StorageOffset::ZERO, range.end, 10).unwrap();
        let streams: Vec<_> = records.iter().map(|r| r.stream.as_str()).collect();
        assert_eq!(streams, vec!["s", "bulk", "bulk"]);
    }

    #[test]
    fn concurrent_writers_share_one_order() {
        let store = Arc::new(InMemoryBlobStore::new());
        let drivers: Vec<_> = (0..4).map(|_| Arc::new(open(&store))).collect();

        let handles: Vec<_> = drivers
            .iter()
            .enumerate()
            .map(|(w, driver)| {
                let driver = Arc::clone(driver);
                thread::spawn(move || {
                    for i in 0..25u32 {
                        driver.append(&format!("w{w}"), &i.to_le_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tail = drivers[0].tail().unwrap();
        let records = drivers[0].read_page(StorageOffset::ZERO, tail, 1000).unwrap();
        assert_eq!(records.len(), 100);
        for pair in records.windows(2) {
            assert_eq!(pair[0].next_offset, pair[1].offset);
        }
    }

    #[test]
    fn import_references_staged_payloads() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);
        let batch = seal(&driver, "bulk", &[b"aa", b"bbb"]);

        let outcome = driver.import(batch).unwrap();
        assert_eq!(
            outcome.range(),
            OffsetRange::new(0, frame_len(4, 2) + frame_len(4, 3))
        );
        assert_eq!(driver.import(batch).unwrap(), ImportOutcome::AlreadyCommitted(outcome.range()));

        driver.discard(batch).unwrap();
        let records = driver.read_page(StorageOffset::ZERO, outcome.range().end, 10).unwrap();
        assert_eq!(records[1].payload, b"bbb");
    }

    #[test]
    fn incomplete_batches_are_rejected() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);

        let unsealed = BatchId::generate();
        driver.stage(unsealed, 0, b"x").unwrap();
        assert_eq!(driver.import(unsealed).unwrap_err().kind(), ErrorKind::IncompleteBatch);

        let batch = seal(&driver, "s", &[b"x", b"y"]);
        store.delete(&BlobLayout::new("log").staged(batch, 1)).unwrap();
        assert_eq!(driver.import(batch).unwrap_err().kind(), ErrorKind::IncompleteBatch);
        assert_eq!(driver.tail().unwrap(), StorageOffset::ZERO);
    }

    #[test]
    fn discard_removes_uncommitted_staging() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);
        let batch = seal(&driver, "s", &[b"x", b"y"]);

        driver.discard(batch).unwrap();
        assert!(store.list(&BlobLayout::new("log").staging_prefix(batch)).unwrap().is_empty());
    }

    #[test]
    fn failed_head_publish_is_clean_when_head_is_readable() {
        let store = Arc::new(FailingHeadStore {
            inner: InMemoryBlobStore::new(),
            head_failures: AtomicU32::new(0),
            fail_rereads: false,
        });
        let driver = BlobLogDriver::open(store.clone(), "log", Config::default()).unwrap();
        let first = driver.append("s", b"one").unwrap();

        store.head_failures.store(1, Ordering::SeqCst);
        let err = driver.append("s", b"two").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(driver.tail().unwrap(), first.end);

        let retried = driver.append("s", b"two").unwrap();
        assert_eq!(retried.start, first.end);
    }

    #[test]
    fn unresolvable_head_publish_is_ambiguous() {
        // One head write fails, then every head read fails.
        let store = Arc::new(FailingHeadStore {
            inner: InMemoryBlobStore::new(),
            head_failures: AtomicU32::new(1),
            fail_rereads: true,
        });
        let driver = BlobLogDriver::open(store.clone(), "log", Config::default()).unwrap();

        let err = driver.append("s", b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousWrite);
        assert!(!err.is_retryable());
        assert_eq!(store.inner.list("log/chunks/").unwrap().len(), 1);
    }

    /// Blob store whose armed head write lands, then lets a rival writer
    /// commit on top before reporting a failure.
    struct RacingHeadStore {
        inner: Arc<InMemoryBlobStore>,
        rival: BlobLogDriver,
        armed: AtomicBool,
    }

    impl RacingHeadStore {
        fn new() -> Self {
            let inner = Arc::new(InMemoryBlobStore::new());
            let rival = open(&inner);
            Self {
                inner,
                rival,
                armed: AtomicBool::new(false),
            }
        }
    }

    impl BlobStore for RacingHeadStore {
        fn get(&self, name: &str) -> StorageResult<Option<Blob>> {
            self.inner.get(name)
        }

        fn get_range(&self, name: &str, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.get_range(name, offset, len)
        }

        fn head(&self, name: &str) -> StorageResult<Option<BlobMeta>> {
            self.inner.head(name)
        }

        fn put(&self, name: &str, data: &[u8], condition: PutCondition) -> StorageResult<BlobVersion> {
            if name.ends_with("/head") && self.armed.swap(false, Ordering::SeqCst) {
                self.inner.put(name, data, condition)?;
                self.rival
                    .append("theirs", b"on top")
                    .map_err(|e| StorageError::unavailable(e.to_string()))?;
                return Err(StorageError::unavailable("connection reset after head write"));
            }
            self.inner.put(name, data, condition)
        }

        fn delete(&self, name: &str) -> StorageResult<bool> {
            self.inner.delete(name)
        }

        fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.list(prefix)
        }
    }

    #[test]
    fn failed_head_publish_overtaken_by_rival_still_commits() {
        let store = Arc::new(RacingHeadStore::new());
        let driver = BlobLogDriver::open(store.clone(), "log", Config::default()).unwrap();
        driver.append("mine", b"first").unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let range = driver.append("mine", b"second").unwrap();
        assert_eq!(driver.commit_count().unwrap(), 3);
        assert_eq!(store.inner.list("log/chunks/").unwrap().len(), 3);

        let tail = driver.tail().unwrap();
        let records = driver.read_page(StorageOffset::ZERO, tail, 10).unwrap();
        let payloads: Vec<_> = records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"first"[..], &b"second"[..], &b"on top"[..]]);
        assert_eq!(records[1].offset, range.start);
        assert_eq!(records[2].stream, "theirs");
    }

    #[test]
    fn committed_batch_cannot_be_restaged() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);
        let batch = seal(&driver, "bulk", &[b"aa", b"bb"]);
        let range = driver.import(batch).unwrap().range();

        let err = driver.stage(batch, 1, b"zz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let records = driver.read_page(StorageOffset::ZERO, range.end, 10).unwrap();
        assert_eq!(records[1].payload, b"bb");
    }

    #[test]
    fn unreadable_chunk_ends_page_after_intact_records() {
        let store = Arc::new(InMemoryBlobStore::new());
        let driver = open(&store);
        driver.append("s", b"one").unwrap();
        let lost = driver.append("s", b"two").unwrap();
        driver.append("s", b"three").unwrap();

        let frame = encode_frame("s", b"two").unwrap();
        let chunks = store.list("log/chunks/").unwrap();
        let victim = chunks
            .iter()
            .find(|name| store.get(name).unwrap().unwrap().data == frame)
            .unwrap();
        store.delete(victim).unwrap();

        let tail = driver.tail().unwrap();
        let page = driver.read_page(StorageOffset::ZERO, tail, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].next_offset, lost.start);
        let err = driver.read_page(lost.start, tail, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn missing_log_is_rejected_without_create() {
        let store = Arc::new(InMemoryBlobStore::new());
        let result = BlobLogDriver::open(store, "log", Config::default().create_if_missing(false));
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InvalidArgument));
    }
}
