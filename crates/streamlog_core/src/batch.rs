//! Identifiers and manifests of staged batches.

use crate::error::{LogError, LogResult};
use crate::offset::OffsetRange;
use crate::record::frame_len;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one staged batch.
///
/// Identifiers are random (v4) so concurrent producers never collide, and
/// they double as the idempotence key of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps raw identifier bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for BatchId {
    type Err = LogError;

    fn from_str(s: &str) -> LogResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| LogError::invalid_argument(format!("invalid batch id '{s}': {e}")))
    }
}

/// Length and checksum of one staged payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Payload length in bytes.
    pub len: u32,
    /// CRC-32 of the payload.
    pub crc: u32,
}

/// Everything an import needs to know about a fully staged batch.
///
/// Persisted when the batch is sealed. Entry `i` describes the payload
/// staged at index `i`; the import commits them in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    /// The batch being described.
    pub batch: BatchId,
    /// Stream tag shared by every record of the batch.
    pub stream: String,
    /// One entry per staged payload, in import order.
    pub entries: Vec<StagedEntry>,
}

impl BatchManifest {
    /// Returns the number of records in the batch.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the log bytes the batch occupies once committed.
    #[must_use]
    pub fn total_frame_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| frame_len(self.stream.len(), entry.len as usize))
            .sum()
    }

    /// Serializes the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupted`] if CBOR encoding fails.
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out)
            .map_err(|e| LogError::corrupted(format!("failed to encode batch manifest: {e}")))?;
        Ok(out)
    }

    /// Deserializes a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupted`] if `data` is not a valid manifest.
    pub fn decode(data: &[u8]) -> LogResult<Self> {
        ciborium::from_reader(data)
            .map_err(|e| LogError::corrupted(format!("invalid batch manifest: {e}")))
    }
}

/// Result of importing a staged batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// This call committed the batch.
    Committed(OffsetRange),
    /// An earlier call already committed the batch at this range.
    AlreadyCommitted(OffsetRange),
}

impl ImportOutcome {
    /// Returns the committed range regardless of who committed it.
    #[must_use]
    pub fn range(&self) -> OffsetRange {
        match self {
            Self::Committed(range) | Self::AlreadyCommitted(range) => *range,
        }
    }

    /// Returns true if an earlier call committed the batch.
    #[must_use]
    pub fn was_already_committed(&self) -> bool {
        matches!(self, Self::AlreadyCommitted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_parse_back() {
        let a = BatchId::generate();
        let b = BatchId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<BatchId>().unwrap(), a);
        assert_eq!(BatchId::from_bytes(*a.as_bytes()), a);
        assert!("not-a-uuid".parse::<BatchId>().is_err());
    }

    #[test]
    fn manifest_survives_cbor() {
        let manifest = BatchManifest {
            batch: BatchId::generate(),
            stream: "orders".to_string(),
            entries: vec![StagedEntry { len: 3, crc: 7 }, StagedEntry { len: 0, crc: 0 }],
        };
        let decoded = BatchManifest::decode(&manifest.encode().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.record_count(), 2);
    }

    #[test]
    fn frame_bytes_match_framing() {
        let manifest = BatchManifest {
            batch: BatchId::generate(),
            stream: "ab".to_string(),
            entries: vec![StagedEntry { len: 10, crc: 0 }; 3],
        };
        assert_eq!(manifest.total_frame_bytes(), 3 * frame_len(2, 10));
    }

    #[test]
    fn garbage_manifest_is_corruption() {
        assert!(BatchManifest::decode(b"\xff\x00garbage").is_err());
    }
}
