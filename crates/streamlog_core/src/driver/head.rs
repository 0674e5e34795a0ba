//! The commit pointer of a local log.
//!
//! ```text
//! | magic "SLHD" (4) | version (2) | tail (8) | commits (8) | crc32 (4) |
//! ```
//!
//! Bytes of `stream.dat` beyond `tail` were never committed. Replacing this
//! file is the single atomic step that makes a commit visible.

use crate::error::{LogError, LogResult};

/// Magic bytes for the HEAD file.
pub const HEAD_MAGIC: [u8; 4] = *b"SLHD";

/// Current HEAD format version.
pub const HEAD_VERSION: u16 = 1;

const HEAD_SIZE: usize = 4 + 2 + 8 + 8 + 4;

/// The committed state of a local log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogHead {
    /// Offset just past the last committed record.
    pub tail: u64,
    /// Number of commits published so far.
    pub commits: u64,
}

impl LogHead {
    /// Returns the head after one more commit ending at `tail`.
    #[must_use]
    pub fn advanced(self, tail: u64) -> Self {
        Self {
            tail,
            commits: self.commits + 1,
        }
    }

    /// Encodes the head to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEAD_SIZE);
        buf.extend_from_slice(&HEAD_MAGIC);
        buf.extend_from_slice(&HEAD_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.tail.to_le_bytes());
        buf.extend_from_slice(&self.commits.to_le_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a head from bytes.
    pub fn decode(data: &[u8]) -> LogResult<Self> {
        if data.len() < 4 || data[0..4] != HEAD_MAGIC {
            return Err(LogError::corrupted("invalid HEAD magic"));
        }
        if data.len() != HEAD_SIZE {
            return Err(LogError::corrupted(format!(
                "HEAD is {} bytes, expected {HEAD_SIZE}",
                data.len()
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > HEAD_VERSION {
            return Err(LogError::corrupted(format!(
                "unsupported HEAD version: {version}"
            )));
        }

        let stored = u32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        if stored != crc32fast::hash(&data[..22]) {
            return Err(LogError::corrupted("HEAD checksum mismatch"));
        }

        Ok(Self {
            tail: read_u64(&data[6..14]),
            commits: read_u64(&data[14..22]),
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        let head = LogHead::default().advanced(100).advanced(250);
        assert_eq!(head.commits, 2);

        let decoded = LogHead::decode(&head.encode()).unwrap();
        assert_eq!(decoded, head);
    }

    #[test]
    fn torn_head_is_rejected() {
        let encoded = LogHead { tail: 9, commits: 1 }.encode();
        assert!(LogHead::decode(&encoded[..10]).is_err());

        let mut flipped = encoded.clone();
        flipped[8] ^= 0xff;
        assert!(LogHead::decode(&flipped).is_err());
    }
}
