//! Integration tests for the async partitioned writer.
//!
//! These exercise the full façade → mailbox → writer path with concurrent
//! submitters, scripted failures and hanging writers, asserting the
//! ordering, laziness, containment and independence contracts.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use vellum_core::{Offset, PartitionId, SourceOffset, Timestamp};
use vellum_sink::{
    AsyncPartitionedWriter, FaultPlan, PartitionedWriter, SimulatedWriter, SinkConfig, SinkError,
    WriterCall, WriterResult,
};

fn sink_pair() -> (SimulatedWriter, AsyncPartitionedWriter<Bytes>) {
    let writer = SimulatedWriter::new();
    let sink = AsyncPartitionedWriter::spawn(writer.clone(), SinkConfig::new());
    (writer, sink)
}

fn at(partition: u64, offset: u64) -> SourceOffset {
    SourceOffset::new(PartitionId::new(partition), Offset::new(offset))
}

/// Writer that parks on a semaphore at the start of every call.
///
/// With no permits the mailbox hangs inside the current call, which is how
/// these tests freeze one sink instance or keep queued commands pending.
struct GateWriter {
    gate: Arc<Semaphore>,
    entered: Arc<AtomicU32>,
}

impl GateWriter {
    fn new() -> (Self, Arc<Semaphore>, Arc<AtomicU32>) {
        let gate = Arc::new(Semaphore::new(0));
        let entered = Arc::new(AtomicU32::new(0));
        let writer = Self {
            gate: Arc::clone(&gate),
            entered: Arc::clone(&entered),
        };
        (writer, gate, entered)
    }

    async fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate closed").forget();
    }
}

#[async_trait]
impl PartitionedWriter<Bytes> for GateWriter {
    async fn write(
        &mut self,
        _when: Timestamp,
        _offset: SourceOffset,
        _message: Bytes,
    ) -> WriterResult<()> {
        self.pass().await;
        Ok(())
    }

    async fn close(&mut self) -> WriterResult<()> {
        self.pass().await;
        Ok(())
    }

    async fn drop_partition(&mut self, _partition: PartitionId) -> WriterResult<()> {
        self.pass().await;
        Ok(())
    }

    async fn expire_consumers(&mut self) -> WriterResult<()> {
        self.pass().await;
        Ok(())
    }

    async fn starting_offsets(
        &mut self,
        _partitions: &BTreeSet<PartitionId>,
    ) -> WriterResult<std::collections::HashMap<PartitionId, Offset>> {
        self.pass().await;
        Ok(std::collections::HashMap::new())
    }

    async fn heartbeat(&mut self, _partition: PartitionId, _offset: Offset) -> WriterResult<()> {
        self.pass().await;
        Ok(())
    }
}

/// Writer that yields mid-call and tracks how many calls overlap in time.
struct ProbeWriter {
    in_flight: Arc<AtomicU32>,
    max_in_flight: Arc<AtomicU32>,
}

impl ProbeWriter {
    fn new() -> (Self, Arc<AtomicU32>) {
        let max_in_flight = Arc::new(AtomicU32::new(0));
        let writer = Self {
            in_flight: Arc::new(AtomicU32::new(0)),
            max_in_flight: Arc::clone(&max_in_flight),
        };
        (writer, max_in_flight)
    }

    async fn observe(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartitionedWriter<Bytes> for ProbeWriter {
    async fn write(
        &mut self,
        _when: Timestamp,
        _offset: SourceOffset,
        _message: Bytes,
    ) -> WriterResult<()> {
        self.observe().await;
        Ok(())
    }

    async fn close(&mut self) -> WriterResult<()> {
        self.observe().await;
        Ok(())
    }

    async fn drop_partition(&mut self, _partition: PartitionId) -> WriterResult<()> {
        self.observe().await;
        Ok(())
    }

    async fn expire_consumers(&mut self) -> WriterResult<()> {
        self.observe().await;
        Ok(())
    }

    async fn starting_offsets(
        &mut self,
        _partitions: &BTreeSet<PartitionId>,
    ) -> WriterResult<std::collections::HashMap<PartitionId, Offset>> {
        self.observe().await;
        Ok(std::collections::HashMap::new())
    }

    async fn heartbeat(&mut self, _partition: PartitionId, _offset: Offset) -> WriterResult<()> {
        self.observe().await;
        Ok(())
    }
}

/// Writer whose write panics, to pin down what a buggy implementation does
/// to the mailbox task.
struct PanicWriter;

#[async_trait]
impl PartitionedWriter<Bytes> for PanicWriter {
    async fn write(
        &mut self,
        _when: Timestamp,
        _offset: SourceOffset,
        _message: Bytes,
    ) -> WriterResult<()> {
        panic!("writer bug");
    }

    async fn close(&mut self) -> WriterResult<()> {
        Ok(())
    }

    async fn drop_partition(&mut self, _partition: PartitionId) -> WriterResult<()> {
        Ok(())
    }

    async fn expire_consumers(&mut self) -> WriterResult<()> {
        Ok(())
    }

    async fn starting_offsets(
        &mut self,
        _partitions: &BTreeSet<PartitionId>,
    ) -> WriterResult<std::collections::HashMap<PartitionId, Offset>> {
        Ok(std::collections::HashMap::new())
    }

    async fn heartbeat(&mut self, _partition: PartitionId, _offset: Offset) -> WriterResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// P1: total order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_submitter_writes_apply_in_submission_order() {
    let (writer, sink) = sink_pair();

    // Submit everything before polling anything: acceptance order is fixed
    // at call time.
    let replies: Vec<_> = (0..32_u64)
        .map(|i| {
            sink.write(Timestamp::from_millis(i64::try_from(i).unwrap()), at(0, i), move || {
                Bytes::from(format!("event-{i}"))
            })
        })
        .collect();
    for reply in replies {
        reply.await.unwrap();
    }

    let offsets: Vec<u64> = writer
        .calls()
        .into_iter()
        .map(|call| match call {
            WriterCall::Write { offset, .. } => offset.offset().get(),
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(offsets, (0..32_u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_concurrent_submitters_keep_per_caller_order() {
    let (writer, sink) = sink_pair();

    let mut tasks = Vec::new();
    for caller in 0..4_u64 {
        let sink = sink.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 0..16_u64 {
                sink.write(Timestamp::from_millis(0), at(caller, seq), move || {
                    Bytes::from(format!("{caller}:{seq}"))
                })
                .await
                .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let calls = writer.calls();
    assert_eq!(calls.len(), 64);

    // Interleaving across callers is arbitrary; within each caller the
    // offsets must be strictly ascending.
    for caller in 0..4_u64 {
        let seen: Vec<u64> = calls
            .iter()
            .filter_map(|call| match call {
                WriterCall::Write { offset, .. }
                    if offset.partition() == PartitionId::new(caller) =>
                {
                    Some(offset.offset().get())
                }
                _ => None,
            })
            .collect();
        assert_eq!(seen, (0..16_u64).collect::<Vec<_>>(), "caller {caller}");
    }
}

#[tokio::test]
async fn test_writer_never_observes_overlapping_calls() {
    let (writer, max_in_flight) = ProbeWriter::new();
    let sink = AsyncPartitionedWriter::spawn(writer, SinkConfig::new());

    let mut tasks = Vec::new();
    for i in 0..8_u64 {
        let sink = sink.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 0..8_u64 {
                sink.write(Timestamp::from_millis(0), at(i, seq), || Bytes::new())
                    .await
                    .unwrap();
                sink.heartbeat(PartitionId::new(i), Offset::new(seq)).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// P2: lazy materialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_producer_runs_exactly_once_at_execution_time() {
    let (writer, gate, _entered) = GateWriter::new();
    let sink = AsyncPartitionedWriter::spawn(writer, SinkConfig::new());

    let produced = Arc::new(AtomicU32::new(0));

    // First write parks the mailbox at the gate; the second stays queued.
    let first = sink.write(Timestamp::from_millis(0), at(0, 0), || Bytes::from("first"));
    let counter = Arc::clone(&produced);
    let second = sink.write(Timestamp::from_millis(0), at(0, 1), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Bytes::from("second")
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(produced.load(Ordering::SeqCst), 0, "produced at submission");

    gate.add_permits(2);
    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(produced.load(Ordering::SeqCst), 1, "must run exactly once");
}

// ---------------------------------------------------------------------------
// P3: failure containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_request_fails_alone_and_processing_continues() {
    let (writer, sink) = sink_pair();
    writer.set_faults(FaultPlan::none().with_force_write_fail());

    let failed = sink
        .write(Timestamp::from_millis(1), at(0, 10), || Bytes::from("doomed"))
        .await
        .unwrap_err();
    assert!(failed.is_writer_error());
    assert!(matches!(failed, SinkError::Write { .. }));

    // Requests behind the failure still execute and resolve normally.
    sink.write(Timestamp::from_millis(2), at(0, 11), || Bytes::from("fine"))
        .await
        .unwrap();
    sink.heartbeat(PartitionId::new(1), Offset::new(3)).await.unwrap();

    // The failing call was still attempted, in order.
    let calls = writer.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], WriterCall::Write { message, .. } if message == "doomed"));
    assert!(matches!(&calls[1], WriterCall::Write { message, .. } if message == "fine"));
}

#[tokio::test]
async fn test_query_failure_is_a_distinct_kind_with_no_partial_result() {
    let (writer, sink) = sink_pair();
    writer.set_starting_offset(PartitionId::new(0), Offset::new(100));
    writer.set_faults(FaultPlan::none().with_force_query_fail());

    let requested: BTreeSet<_> = [PartitionId::new(0)].into();
    let err = sink.starting_offsets(requested.clone()).await.unwrap_err();
    assert!(matches!(err, SinkError::Query { .. }));

    // The switch fired once; a resubmission succeeds.
    let offsets = sink.starting_offsets(requested).await.unwrap();
    assert_eq!(offsets.get(&PartitionId::new(0)), Some(&Offset::new(100)));
}

// ---------------------------------------------------------------------------
// P4: close ordering, and the write/write/close scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_writes_accepted_before_close_apply_before_close() {
    let (writer, sink) = sink_pair();

    let t1 = Timestamp::from_millis(1_000);
    let t2 = Timestamp::from_millis(2_000);
    let first = sink.write(t1, at(0, 10), || Bytes::from("a"));
    let second = sink.write(t2, at(0, 11), || Bytes::from("b"));
    let closed = sink.close();

    first.await.unwrap();
    second.await.unwrap();
    closed.await.unwrap();

    assert_eq!(
        writer.calls(),
        vec![
            WriterCall::Write {
                when: t1,
                offset: at(0, 10),
                message: Bytes::from("a"),
            },
            WriterCall::Write {
                when: t2,
                offset: at(0, 11),
                message: Bytes::from("b"),
            },
            WriterCall::Close,
        ]
    );
    assert!(writer.is_closed());
}

#[tokio::test]
async fn test_post_close_submissions_are_rejected_except_close() {
    let (writer, sink) = sink_pair();

    sink.close().await.unwrap();

    let err = sink
        .write(Timestamp::from_millis(0), at(0, 0), || Bytes::from("late"))
        .await
        .unwrap_err();
    assert_eq!(err, SinkError::Closed);
    assert_eq!(
        sink.drop_partition(PartitionId::new(0)).await.unwrap_err(),
        SinkError::Closed
    );

    // Close stays forwarded: idempotency belongs to the writer.
    sink.close().await.unwrap();
    assert_eq!(writer.calls(), vec![WriterCall::Close, WriterCall::Close]);
}

// ---------------------------------------------------------------------------
// P5: instance independence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_a_hung_instance_does_not_delay_another() {
    let (gated_writer, _gate, entered) = GateWriter::new();
    let hung = AsyncPartitionedWriter::spawn(gated_writer, SinkConfig::new());
    let (_writer, live) = sink_pair();

    // Freeze the first instance inside a write it can never finish.
    let pending = hung.write(Timestamp::from_millis(0), at(0, 0), || Bytes::from("stuck"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(entered.load(Ordering::SeqCst), 1);

    // The other instance keeps completing.
    timeout(Duration::from_secs(1), live.expire_consumers())
        .await
        .expect("independent sink was delayed")
        .unwrap();

    // And the frozen one is still frozen.
    assert!(timeout(Duration::from_millis(50), pending).await.is_err());
}

// ---------------------------------------------------------------------------
// P6: starting offsets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_starting_offsets_returns_exactly_the_recorded_resume_points() {
    let (writer, sink) = sink_pair();
    writer.set_starting_offset(PartitionId::new(0), Offset::new(100));
    writer.set_starting_offset(PartitionId::new(1), Offset::new(50));

    let requested: BTreeSet<_> = [PartitionId::new(0), PartitionId::new(1), PartitionId::new(2)].into();
    let offsets = sink.starting_offsets(requested).await.unwrap();

    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets.get(&PartitionId::new(0)), Some(&Offset::new(100)));
    assert_eq!(offsets.get(&PartitionId::new(1)), Some(&Offset::new(50)));
    assert!(!offsets.contains_key(&PartitionId::new(2)));
}

// ---------------------------------------------------------------------------
// Deadlines and mailbox loss
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reply_deadline_fails_the_reply_not_the_request() {
    let (writer, gate, entered) = GateWriter::new();
    let sink = AsyncPartitionedWriter::spawn(
        writer,
        SinkConfig::new().with_reply_timeout(Duration::from_millis(50)),
    );

    let err = sink
        .write(Timestamp::from_millis(0), at(0, 0), || Bytes::from("slow"))
        .await
        .unwrap_err();
    assert_eq!(err, SinkError::Timeout { operation: "write" });

    // The request was dequeued and is executing; expiry cancelled nothing.
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    gate.add_permits(1);
}

#[tokio::test]
async fn test_panicking_writer_surfaces_as_stopped_mailbox() {
    let sink = AsyncPartitionedWriter::spawn(PanicWriter, SinkConfig::new());

    let err = sink
        .write(Timestamp::from_millis(0), at(0, 0), || Bytes::from("boom"))
        .await
        .unwrap_err();
    assert_eq!(err, SinkError::MailboxStopped);

    // The task is gone; later submissions fail the same way, immediately.
    let err = sink.heartbeat(PartitionId::new(0), Offset::new(0)).await.unwrap_err();
    assert_eq!(err, SinkError::MailboxStopped);
}

// ---------------------------------------------------------------------------
// End-to-end: consume, heartbeat, resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_heartbeats_advance_resume_points_until_partition_dropped() {
    let (_writer, sink) = sink_pair();

    sink.write(Timestamp::from_millis(1), at(3, 41), || Bytes::from("payload"))
        .await
        .unwrap();
    sink.heartbeat(PartitionId::new(3), Offset::new(41)).await.unwrap();

    let requested: BTreeSet<_> = [PartitionId::new(3)].into();
    let offsets = sink.starting_offsets(requested.clone()).await.unwrap();
    assert_eq!(offsets.get(&PartitionId::new(3)), Some(&Offset::new(42)));

    // Rebalance: the partition moves away, its resume point goes with it.
    sink.drop_partition(PartitionId::new(3)).await.unwrap();
    let offsets = sink.starting_offsets(requested).await.unwrap();
    assert!(offsets.is_empty());
}
