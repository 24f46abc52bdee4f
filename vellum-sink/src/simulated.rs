//! Simulated writer for deterministic testing.
//!
//! An in-memory [`PartitionedWriter`] that records every call in the order
//! it arrives and fails on scripted switches. The sink's own tests use it
//! to assert ordering and failure containment; downstream pipelines can use
//! it to test their consume-and-write loops without a filesystem.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use vellum_core::{Offset, PartitionId, SourceOffset, Timestamp};

use crate::error::{WriterError, WriterResult};
use crate::writer::PartitionedWriter;

/// Scripted failure switches.
///
/// Each switch fails the next matching call once, then resets. The failed
/// call is still recorded: a raising writer was still invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultPlan {
    /// Fail the next write.
    pub force_write_fail: bool,
    /// Fail the next close.
    pub force_close_fail: bool,
    /// Fail the next drop-partition.
    pub force_drop_partition_fail: bool,
    /// Fail the next expire-consumers sweep.
    pub force_expire_fail: bool,
    /// Fail the next starting-offsets query.
    pub force_query_fail: bool,
    /// Fail the next heartbeat.
    pub force_heartbeat_fail: bool,
}

impl FaultPlan {
    /// Creates a plan with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Forces the next write to fail.
    #[must_use]
    pub const fn with_force_write_fail(mut self) -> Self {
        self.force_write_fail = true;
        self
    }

    /// Forces the next close to fail.
    #[must_use]
    pub const fn with_force_close_fail(mut self) -> Self {
        self.force_close_fail = true;
        self
    }

    /// Forces the next starting-offsets query to fail.
    #[must_use]
    pub const fn with_force_query_fail(mut self) -> Self {
        self.force_query_fail = true;
        self
    }

    /// Forces the next heartbeat to fail.
    #[must_use]
    pub const fn with_force_heartbeat_fail(mut self) -> Self {
        self.force_heartbeat_fail = true;
        self
    }
}

/// One observed writer call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCall {
    /// A write, with the materialized payload.
    Write {
        /// Event time.
        when: Timestamp,
        /// Source position of the event.
        offset: SourceOffset,
        /// The payload the producer materialized.
        message: Bytes,
    },
    /// A close.
    Close,
    /// A drop-partition.
    DropPartition {
        /// The dropped partition.
        partition: PartitionId,
    },
    /// An expire-consumers sweep.
    ExpireConsumers,
    /// A starting-offsets query.
    StartingOffsets {
        /// The requested partitions, in ascending order.
        partitions: Vec<PartitionId>,
    },
    /// A heartbeat.
    Heartbeat {
        /// The partition the heartbeat is for.
        partition: PartitionId,
        /// The progress marker.
        offset: Offset,
    },
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<WriterCall>,
    faults: FaultPlan,
    starting: HashMap<PartitionId, Offset>,
    closed: bool,
}

/// In-memory recording writer with scripted fault injection.
///
/// Clones share state: keep one clone for assertions and move the other
/// into the mailbox.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned, which indicates a
/// previous panic in a critical section.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWriter {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedWriter {
    /// Creates an empty simulated writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scripted fault switches.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.lock().faults = faults;
    }

    /// Sets the recorded resume point for a partition, as a
    /// starting-offsets query would report it.
    pub fn set_starting_offset(&self, partition: PartitionId, offset: Offset) {
        self.lock().starting.insert(partition, offset);
    }

    /// Returns every call observed so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<WriterCall> {
        self.lock().calls.clone()
    }

    /// Returns true if a close has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("simulated writer lock poisoned")
    }
}

#[async_trait]
impl PartitionedWriter<Bytes> for SimulatedWriter {
    async fn write(
        &mut self,
        when: Timestamp,
        offset: SourceOffset,
        message: Bytes,
    ) -> WriterResult<()> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::Write {
            when,
            offset,
            message,
        });
        if inner.faults.force_write_fail {
            inner.faults.force_write_fail = false;
            return Err(WriterError::io("write", "injected write failure"));
        }
        if inner.closed {
            return Err(WriterError::Closed);
        }
        Ok(())
    }

    async fn close(&mut self) -> WriterResult<()> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::Close);
        if inner.faults.force_close_fail {
            inner.faults.force_close_fail = false;
            return Err(WriterError::io("close", "injected close failure"));
        }
        inner.closed = true;
        Ok(())
    }

    async fn drop_partition(&mut self, partition: PartitionId) -> WriterResult<()> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::DropPartition { partition });
        if inner.faults.force_drop_partition_fail {
            inner.faults.force_drop_partition_fail = false;
            return Err(WriterError::io("drop_partition", "injected drop failure"));
        }
        inner.starting.remove(&partition);
        Ok(())
    }

    async fn expire_consumers(&mut self) -> WriterResult<()> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::ExpireConsumers);
        if inner.faults.force_expire_fail {
            inner.faults.force_expire_fail = false;
            return Err(WriterError::io("expire_consumers", "injected expire failure"));
        }
        Ok(())
    }

    async fn starting_offsets(
        &mut self,
        partitions: &BTreeSet<PartitionId>,
    ) -> WriterResult<HashMap<PartitionId, Offset>> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::StartingOffsets {
            partitions: partitions.iter().copied().collect(),
        });
        if inner.faults.force_query_fail {
            inner.faults.force_query_fail = false;
            return Err(WriterError::io("starting_offsets", "injected query failure"));
        }
        Ok(partitions
            .iter()
            .filter_map(|p| inner.starting.get(p).map(|offset| (*p, *offset)))
            .collect())
    }

    async fn heartbeat(&mut self, partition: PartitionId, offset: Offset) -> WriterResult<()> {
        let mut inner = self.lock();
        inner.calls.push(WriterCall::Heartbeat { partition, offset });
        if inner.faults.force_heartbeat_fail {
            inner.faults.force_heartbeat_fail = false;
            return Err(WriterError::io("heartbeat", "injected heartbeat failure"));
        }
        if inner.closed {
            return Err(WriterError::Closed);
        }
        inner.starting.insert(partition, offset.next());
        Ok(())
    }
}
