//! Positions in the global log.

use crate::error::{LogError, LogResult};
use std::fmt;

/// A byte position in the global log.
///
/// Offsets are assigned by the backend driver when a record commits and are
/// never reassigned or reused. [`StorageOffset::ZERO`] is the start of the
/// log. As a read cursor an offset is inclusive: reading from `o` returns
/// every committed record whose offset is `>= o`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageOffset(u64);

impl StorageOffset {
    /// The start of the log.
    pub const ZERO: Self = Self(0);

    /// Creates an offset from a signed byte count.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if `offset_in_bytes` is negative.
    pub fn new(offset_in_bytes: i64) -> LogResult<Self> {
        u64::try_from(offset_in_bytes)
            .map(Self)
            .map_err(|_| {
                LogError::invalid_argument(format!(
                    "offset must be non-negative, got {offset_in_bytes}"
                ))
            })
    }

    /// Creates an offset from an unsigned byte count.
    #[must_use]
    pub const fn from_bytes(offset_in_bytes: u64) -> Self {
        Self(offset_in_bytes)
    }

    /// Returns the raw byte position.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the offset `len` bytes further along the log.
    #[must_use]
    pub const fn advance(self, len: u64) -> Self {
        Self(self.0.saturating_add(len))
    }
}

impl fmt::Display for StorageOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset {}b", self.0)
    }
}

impl TryFrom<i64> for StorageOffset {
    type Error = LogError;

    fn try_from(value: i64) -> LogResult<Self> {
        Self::new(value)
    }
}

impl From<StorageOffset> for u64 {
    fn from(offset: StorageOffset) -> Self {
        offset.0
    }
}

/// The half-open byte range `[start, end)` occupied by one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetRange {
    /// Offset of the first record in the commit.
    pub start: StorageOffset,
    /// Offset immediately after the last record in the commit.
    pub end: StorageOffset,
}

impl OffsetRange {
    /// Creates a range from raw byte positions.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self {
            start: StorageOffset(start),
            end: StorageOffset(end),
        }
    }

    /// Creates an empty range positioned at `offset`.
    #[must_use]
    pub const fn empty_at(offset: StorageOffset) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Returns the number of log bytes covered.
    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Returns true if the range covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end.0 <= self.start.0
    }

    /// Returns true if `offset` falls inside the range.
    #[must_use]
    pub fn contains(&self, offset: StorageOffset) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}b..{}b)", self.start.0, self.end.0)
    }
}
