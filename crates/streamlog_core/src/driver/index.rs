//! Frame scanning and the sparse offset index.
//!
//! Offsets are byte positions, but a caller may resume from any offset,
//! including one that falls inside a record. Scanning therefore starts
//! from the nearest known frame boundary at or before the requested
//! offset and skips forward.

use crate::error::{ErrorContext, LogError, LogResult, ResultExt};
use crate::offset::StorageOffset;
use crate::record::{decode_frame, decode_header, DecodedFrame, FRAME_HEADER_SIZE};
use streamlog_storage::StorageBackend;

/// Bytes fetched per backend read while scanning.
const READ_CHUNK: usize = 64 * 1024;

/// Frame boundaries sampled every `stride` bytes.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    stride: u64,
    checkpoints: Vec<u64>,
}

impl SparseIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            checkpoints: Vec::new(),
        }
    }

    /// Notes a frame boundary at `offset`.
    ///
    /// Offsets must be observed in ascending order.
    pub fn observe(&mut self, offset: u64) {
        match self.checkpoints.last() {
            None => self.checkpoints.push(offset),
            Some(&last) if offset >= last + self.stride => self.checkpoints.push(offset),
            Some(_) => {}
        }
    }

    /// Returns the greatest known frame boundary `<= target`.
    #[must_use]
    pub fn seek(&self, target: u64) -> u64 {
        let idx = self.checkpoints.partition_point(|&c| c <= target);
        if idx == 0 {
            0
        } else {
            self.checkpoints[idx - 1]
        }
    }

    /// Returns the number of checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }
}

/// Sequential reader over the frames in `[start, until)` of a byte store.
///
/// `start` must be a frame boundary. A frame cut off by `until` means the
/// committed region is damaged and is reported as corruption.
pub struct FrameCursor<'a> {
    backend: &'a dyn StorageBackend,
    ctx: ErrorContext,
    pos: u64,
    until: u64,
    buf: Vec<u8>,
    consumed: usize,
    verify: bool,
}

impl<'a> FrameCursor<'a> {
    /// Creates a cursor.
    pub fn new(
        backend: &'a dyn StorageBackend,
        start: u64,
        until: u64,
        verify: bool,
        ctx: ErrorContext,
    ) -> Self {
        Self {
            backend,
            ctx,
            pos: start,
            until,
            buf: Vec::new(),
            consumed: 0,
            verify,
        }
    }

    /// Returns the offset of the next frame.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Decodes the next frame and returns it with its offset.
    pub fn next_frame(&mut self) -> LogResult<Option<(u64, DecodedFrame)>> {
        if self.pos >= self.until {
            return Ok(None);
        }

        loop {
            let available = &self.buf[self.consumed..];
            if let Some(frame) = decode_frame(available, self.verify).map_err(|e| self.locate(e))? {
                let offset = self.pos;
                self.consumed += frame.frame_len as usize;
                self.pos += frame.frame_len;
                return Ok(Some((offset, frame)));
            }

            let needed = match available.first_chunk::<FRAME_HEADER_SIZE>() {
                Some(header) => decode_header(header).map_err(|e| self.locate(e))? as usize,
                None => FRAME_HEADER_SIZE,
            };
            self.fill(needed)?;
        }
    }

    fn fill(&mut self, needed: usize) -> LogResult<()> {
        let buffered_end = self.pos + (self.buf.len() - self.consumed) as u64;
        if buffered_end >= self.until {
            return Err(LogError::corrupted(format!(
                "truncated frame at offset {} (committed region ends at {})",
                self.pos, self.until
            )));
        }

        self.buf.drain(..self.consumed);
        self.consumed = 0;

        let missing = needed.saturating_sub(self.buf.len());
        let len = missing.max(READ_CHUNK).min((self.until - buffered_end) as usize);
        let ctx = self.ctx.clone().with_offset(StorageOffset::from_bytes(buffered_end));
        let bytes = self.backend.read_at(buffered_end, len).context(&ctx)?;
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn locate(&self, err: LogError) -> LogError {
        match err {
            LogError::Corrupted { message } => {
                LogError::corrupted(format!("{message} at offset {}", self.pos))
            }
            other => other,
        }
    }
}
