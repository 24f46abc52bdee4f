//! Identifiers and positions for events consumed from a partitioned source.
//!
//! Telemetry events arrive from a sharded source stream. Each event is
//! identified by the partition it was consumed from and its offset within
//! that partition. The sink uses these to key writer state and to record
//! resume points.

use std::fmt;

/// Identifier of one independent shard of the source stream.
///
/// Each partition has its own writer state and its own offset sequence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PartitionId(u64);

impl PartitionId {
    /// Creates a partition ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition-{}", self.0)
    }
}

impl From<u64> for PartitionId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<PartitionId> for u64 {
    fn from(id: PartitionId) -> Self {
        id.get()
    }
}

/// Monotonic position marker within one partition's source stream.
///
/// Offsets are opaque beyond ordering and equality. The sink never computes
/// with them; it records them and hands them back as resume points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Position of one consumed event: the partition it came from and its
/// offset within that partition.
///
/// Writes carry a `SourceOffset` rather than a bare [`Offset`] because the
/// underlying writer keys its state by the partition embedded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceOffset {
    partition: PartitionId,
    offset: Offset,
}

impl SourceOffset {
    /// Creates a source offset.
    #[must_use]
    pub const fn new(partition: PartitionId, offset: Offset) -> Self {
        Self { partition, offset }
    }

    /// Returns the partition the event was consumed from.
    #[must_use]
    pub const fn partition(self) -> PartitionId {
        self.partition
    }

    /// Returns the offset within the partition.
    #[must_use]
    pub const fn offset(self) -> Offset {
        self.offset
    }
}

impl fmt::Display for SourceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// Event time in milliseconds since the Unix epoch.
///
/// The writer uses event time, not arrival time, to place events into
/// time-partitioned files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Millis fit in i64 for centuries.
    pub fn now() -> Self {
        let duration = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
