//! Records and their on-log framing.
//!
//! ## Frame Format
//!
//! ```text
//! | magic (4) | version (2) | stream_len (2) | payload_len (4) | stream | payload | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers everything before it.
//! Offsets are byte positions in this logical layout, so a record at offset
//! `o` is followed by the next record at `o + frame_len`. Both drivers use
//! the same arithmetic even when a backend stores payloads separately.

use crate::config::Config;
use crate::error::{LogError, LogResult};
use crate::offset::StorageOffset;

/// Magic bytes identifying a record frame.
pub const FRAME_MAGIC: [u8; 4] = *b"SLRC";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + stream_len (2) + payload_len (4).
pub const FRAME_HEADER_SIZE: usize = 12;

/// Trailer size: crc32 (4).
pub const FRAME_TRAILER_SIZE: usize = 4;

/// A committed record read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedRecord {
    /// Stream tag chosen by the producer.
    pub stream: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Offset at which the record was committed.
    pub offset: StorageOffset,
    /// Offset immediately after this record; resuming here skips it.
    pub next_offset: StorageOffset,
}

/// A payload submitted as part of a staged batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForStaging {
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl RecordForStaging {
    /// Wraps a payload.
    #[must_use]
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

impl From<Vec<u8>> for RecordForStaging {
    fn from(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

impl From<&[u8]> for RecordForStaging {
    fn from(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
        }
    }
}

impl From<String> for RecordForStaging {
    fn from(payload: String) -> Self {
        Self {
            payload: payload.into_bytes(),
        }
    }
}

/// A frame decoded from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Stream tag.
    pub stream: String,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Total frame length in bytes.
    pub frame_len: u64,
}

impl DecodedFrame {
    /// Turns the frame into a record committed at `offset`.
    #[must_use]
    pub fn into_record(self, offset: StorageOffset) -> RetrievedRecord {
        RetrievedRecord {
            stream: self.stream,
            payload: self.payload,
            next_offset: offset.advance(self.frame_len),
            offset,
        }
    }
}

/// Size limits applied to producer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    /// Maximum stream tag length in bytes.
    pub max_stream_name_len: usize,
    /// Maximum payload length in bytes.
    pub max_payload_size: usize,
}

impl RecordLimits {
    /// Extracts the limits from a configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_stream_name_len: config.max_stream_name_len.min(u16::MAX as usize),
            max_payload_size: config.max_payload_size.min(u32::MAX as usize),
        }
    }

    /// Checks a stream tag.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] for an empty or oversized tag.
    pub fn check_stream(&self, stream: &str) -> LogResult<()> {
        if stream.is_empty() {
            return Err(LogError::invalid_argument("stream name must not be empty"));
        }
        if stream.len() > self.max_stream_name_len {
            return Err(LogError::invalid_argument(format!(
                "stream name is {} bytes, maximum is {}",
                stream.len(),
                self.max_stream_name_len
            )));
        }
        Ok(())
    }

    /// Checks a payload.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] for an oversized payload.
    pub fn check_payload(&self, payload: &[u8]) -> LogResult<()> {
        if payload.len() > self.max_payload_size {
            return Err(LogError::invalid_argument(format!(
                "payload is {} bytes, maximum is {}",
                payload.len(),
                self.max_payload_size
            )));
        }
        Ok(())
    }
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Returns the logical size of a frame.
#[must_use]
pub const fn frame_len(stream_len: usize, payload_len: usize) -> u64 {
    (FRAME_HEADER_SIZE + stream_len + payload_len + FRAME_TRAILER_SIZE) as u64
}

/// Returns the CRC-32 of a payload.
#[must_use]
pub fn payload_crc(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encodes one record frame.
///
/// # Errors
///
/// Returns [`LogError::InvalidArgument`] if the stream tag or payload does
/// not fit the length fields.
pub fn encode_frame(stream: &str, payload: &[u8]) -> LogResult<Vec<u8>> {
    let stream_len = u16::try_from(stream.len())
        .map_err(|_| LogError::invalid_argument("stream name exceeds 65535 bytes"))?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| LogError::invalid_argument("payload exceeds 4 GiB"))?;

    let mut frame = Vec::with_capacity(frame_len(stream.len(), payload.len()) as usize);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.extend_from_slice(&stream_len.to_le_bytes());
    frame.extend_from_slice(&payload_len.to_le_bytes());
    frame.extend_from_slice(stream.as_bytes());
    frame.extend_from_slice(payload);

    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Parses a frame header and returns the total frame length.
///
/// # Errors
///
/// Returns [`LogError::Corrupted`] for a bad magic or unsupported version.
pub fn decode_header(header: &[u8; FRAME_HEADER_SIZE]) -> LogResult<u64> {
    if header[0..4] != FRAME_MAGIC {
        return Err(LogError::corrupted("invalid frame magic"));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > FRAME_VERSION {
        return Err(LogError::corrupted(format!(
            "unsupported frame version {version}"
        )));
    }

    let stream_len = u16::from_le_bytes([header[6], header[7]]) as usize;
    let payload_len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    Ok(frame_len(stream_len, payload_len))
}

/// Decodes the frame at the start of `bytes`.
///
/// Returns `Ok(None)` if `bytes` holds less than one complete frame.
///
/// # Errors
///
/// Returns [`LogError::Corrupted`] on a bad magic, version, checksum or a
/// stream tag that is not UTF-8.
pub fn decode_frame(bytes: &[u8], verify_checksum: bool) -> LogResult<Option<DecodedFrame>> {
    let Some(header) = bytes.first_chunk::<FRAME_HEADER_SIZE>() else {
        return Ok(None);
    };
    let total = decode_header(header)? as usize;
    if bytes.len() < total {
        return Ok(None);
    }

    let stream_len = u16::from_le_bytes([header[6], header[7]]) as usize;
    let body_end = total - FRAME_TRAILER_SIZE;

    if verify_checksum {
        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let computed = crc32fast::hash(&bytes[..body_end]);
        if stored != computed {
            return Err(LogError::corrupted(format!(
                "frame checksum mismatch: expected {stored:08x}, got {computed:08x}"
            )));
        }
    }

    let stream_end = FRAME_HEADER_SIZE + stream_len;
    let stream = std::str::from_utf8(&bytes[FRAME_HEADER_SIZE..stream_end])
        .map_err(|_| LogError::corrupted("stream name is not valid UTF-8"))?
        .to_string();

    Ok(Some(DecodedFrame {
        stream,
        payload: bytes[stream_end..body_end].to_vec(),
        frame_len: total as u64,
    }))
}
