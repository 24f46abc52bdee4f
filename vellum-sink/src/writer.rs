//! The narrow interface of the underlying partitioned writer.
//!
//! The concrete writer — file rotation, buffering, serialization, the
//! actual filesystem calls — lives outside this crate. This trait is the
//! entire surface the sink core consumes.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use vellum_core::{Offset, PartitionId, SourceOffset, Timestamp};

use crate::error::WriterResult;

/// A stateful writer persisting events into per-partition files.
///
/// The mailbox owns its writer exclusively and awaits every call to
/// completion before issuing the next, so implementations never observe
/// overlapping calls and may keep per-partition state without locking.
///
/// State after a failed call is whatever the implementation left behind:
/// the sink core neither rolls back nor resets it, and it will keep issuing
/// subsequent calls against that state.
///
/// Implementations doing blocking I/O should wrap it in
/// [`tokio::task::spawn_blocking`] so the mailbox task is suspended, not
/// blocked, while a call is in flight.
#[async_trait]
pub trait PartitionedWriter<M>: Send {
    /// Persists one event at its source position.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    async fn write(
        &mut self,
        when: Timestamp,
        offset: SourceOffset,
        message: M,
    ) -> WriterResult<()>;

    /// Flushes and closes all per-partition state.
    ///
    /// Must be idempotent: the sink forwards repeated close requests.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    async fn close(&mut self) -> WriterResult<()>;

    /// Drops one partition's state, e.g. when the partition is reassigned
    /// to another consumer.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    async fn drop_partition(&mut self, partition: PartitionId) -> WriterResult<()>;

    /// Sweeps idle per-partition resources. Externally time-triggered; the
    /// sink never schedules this itself.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    async fn expire_consumers(&mut self) -> WriterResult<()>;

    /// Returns the offset each requested partition should resume from.
    ///
    /// Partitions with no recorded offset may be omitted from the result;
    /// that policy belongs to the writer.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure. No partial result is returned.
    async fn starting_offsets(
        &mut self,
        partitions: &BTreeSet<PartitionId>,
    ) -> WriterResult<HashMap<PartitionId, Offset>>;

    /// Records a liveness/progress marker for a partition. Carries no
    /// payload to persist.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    async fn heartbeat(&mut self, partition: PartitionId, offset: Offset) -> WriterResult<()>;
}
