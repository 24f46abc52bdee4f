//! The serializing executor behind the async façade.
//!
//! One mailbox is bound 1:1 to one writer instance at spawn time. It is the
//! sole point of mutual exclusion over the writer: commands are drained
//! from an unbounded channel strictly in acceptance order, one writer call
//! in flight at a time, each inside a per-command failure boundary.
//!
//! # Failure policy
//!
//! The executor has two states, running and stopped. Stopped is reached
//! only when every façade handle has been dropped and the queue is drained
//! — never by a failed command and never by a processed close. A writer
//! error is converted into a failed reply for that command alone and the
//! loop continues: writer state is not reinitializable, so restarting is
//! meaningless, and stopping would let one partition's failure block
//! unrelated partitions sharing the writer.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use vellum_core::{Offset, PartitionId, SourceOffset, Timestamp};

use crate::error::{SinkError, SinkResult, WriterResult};
use crate::writer::PartitionedWriter;

/// Zero-argument producer materializing a write's payload.
///
/// Invoked exactly once, by the mailbox, when the write executes — never at
/// submission time.
pub(crate) type MessageProducer<M> = Box<dyn FnOnce() -> M + Send>;

type ReplyTx<T> = oneshot::Sender<SinkResult<T>>;

/// One queued operation request. Immutable once built; the reply sender is
/// internal routing state and never visible to callers.
pub(crate) enum Command<M> {
    /// Persist one event.
    Write {
        when: Timestamp,
        offset: SourceOffset,
        produce: MessageProducer<M>,
        reply: ReplyTx<()>,
    },
    /// Flush and close the writer.
    Close { reply: ReplyTx<()> },
    /// Drop one partition's state.
    DropPartition {
        partition: PartitionId,
        reply: ReplyTx<()>,
    },
    /// Sweep idle per-partition resources.
    ExpireConsumers { reply: ReplyTx<()> },
    /// Fetch resume points for a set of partitions.
    StartingOffsets {
        partitions: BTreeSet<PartitionId>,
        reply: ReplyTx<HashMap<PartitionId, Offset>>,
    },
    /// Record a liveness marker for a partition.
    Heartbeat {
        partition: PartitionId,
        offset: Offset,
        reply: ReplyTx<()>,
    },
}

impl<M> Command<M> {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Close { .. } => "close",
            Self::DropPartition { .. } => "drop_partition",
            Self::ExpireConsumers { .. } => "expire_consumers",
            Self::StartingOffsets { .. } => "starting_offsets",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    const fn is_close(&self) -> bool {
        matches!(self, Self::Close { .. })
    }

    /// Fails the command's reply without executing it.
    pub(crate) fn reject(self, err: SinkError) {
        match self {
            Self::Write { reply, .. }
            | Self::Close { reply }
            | Self::DropPartition { reply, .. }
            | Self::ExpireConsumers { reply }
            | Self::Heartbeat { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::StartingOffsets { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// The mailbox task state: the exclusively-owned writer plus the receiving
/// end of the command channel.
struct Mailbox<W, M> {
    rx: mpsc::UnboundedReceiver<Command<M>>,
    writer: W,
    name: String,
    /// Set once a close command has been processed. Later non-close
    /// commands are rejected without touching the writer; close itself is
    /// still forwarded, since close idempotency belongs to the writer.
    closed: bool,
}

impl<W, M> Mailbox<W, M>
where
    W: PartitionedWriter<M>,
    M: Send,
{
    const fn new(rx: mpsc::UnboundedReceiver<Command<M>>, writer: W, name: String) -> Self {
        Self {
            rx,
            writer,
            name,
            closed: false,
        }
    }

    async fn run(mut self) {
        debug!(sink = %self.name, "mailbox started");

        while let Some(cmd) = self.rx.recv().await {
            if self.closed && !cmd.is_close() {
                cmd.reject(SinkError::Closed);
                continue;
            }
            debug!(sink = %self.name, command = cmd.name(), "dispatch");
            self.execute(cmd).await;
        }

        debug!(sink = %self.name, "mailbox stopped");
    }

    async fn execute(&mut self, cmd: Command<M>) {
        match cmd {
            Command::Write {
                when,
                offset,
                produce,
                reply,
            } => {
                let message = produce();
                let result = self.writer.write(when, offset, message).await;
                self.finish("write", reply, result);
            }
            Command::Close { reply } => {
                let result = self.writer.close().await;
                self.closed = true;
                self.finish("close", reply, result);
            }
            Command::DropPartition { partition, reply } => {
                let result = self.writer.drop_partition(partition).await;
                self.finish("drop_partition", reply, result);
            }
            Command::ExpireConsumers { reply } => {
                let result = self.writer.expire_consumers().await;
                self.finish("expire_consumers", reply, result);
            }
            Command::StartingOffsets { partitions, reply } => {
                let result = self.writer.starting_offsets(&partitions).await;
                if let Err(error) = &result {
                    warn!(
                        sink = %self.name,
                        command = "starting_offsets",
                        %error,
                        "writer call failed; mailbox continues"
                    );
                }
                let _ = reply.send(result.map_err(SinkError::query));
            }
            Command::Heartbeat {
                partition,
                offset,
                reply,
            } => {
                let result = self.writer.heartbeat(partition, offset).await;
                self.finish("heartbeat", reply, result);
            }
        }
    }

    /// Resolves a unit reply, converting a writer error into a failed reply
    /// for this command only. A dropped receiver means the caller gave up;
    /// that is not the mailbox's problem.
    fn finish(&self, command: &'static str, reply: ReplyTx<()>, result: WriterResult<()>) {
        if let Err(error) = &result {
            warn!(
                sink = %self.name,
                command,
                %error,
                "writer call failed; mailbox continues"
            );
        }
        let _ = reply.send(result.map_err(SinkError::write));
    }
}

/// Spawns the mailbox task for `writer` and returns the submission side of
/// its command channel. The writer is moved into the task; no bypassing
/// reference remains.
pub(crate) fn spawn<W, M>(writer: W, name: String) -> mpsc::UnboundedSender<Command<M>>
where
    W: PartitionedWriter<M> + 'static,
    M: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let mailbox = Mailbox::new(rx, writer, name);
    tokio::spawn(mailbox.run());
    tx
}
