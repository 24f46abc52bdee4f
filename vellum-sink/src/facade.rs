//! The public async façade over one writer's mailbox.
//!
//! Every method builds a typed command, submits it at call time and returns
//! a [`Reply`] future. Submission is eager and non-blocking (the mailbox
//! queue is unbounded), so acceptance order — and with it the FIFO
//! execution guarantee — is fixed the moment a method returns, even if the
//! caller never polls the reply.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use vellum_core::{Offset, PartitionId, SourceOffset, Timestamp};

use crate::config::SinkConfig;
use crate::error::{SinkError, SinkResult};
use crate::mailbox::{self, Command};
use crate::writer::PartitionedWriter;

/// Asynchronous, serialized front-end over a [`PartitionedWriter`].
///
/// Cheap to clone; all clones feed the same mailbox and therefore the same
/// writer, in one FIFO lane. The mailbox stops once every clone has been
/// dropped and the queue has drained.
pub struct AsyncPartitionedWriter<M> {
    tx: mpsc::UnboundedSender<Command<M>>,
    reply_timeout: Option<Duration>,
}

impl<M: Send + 'static> AsyncPartitionedWriter<M> {
    /// Spawns a mailbox task owning `writer` and returns the façade bound
    /// to it. The binding is permanent: one façade/mailbox pair per writer
    /// instance, for the writer's whole life.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<W>(writer: W, config: SinkConfig) -> Self
    where
        W: PartitionedWriter<M> + 'static,
    {
        let tx = mailbox::spawn(writer, config.name);
        Self {
            tx,
            reply_timeout: config.reply_timeout,
        }
    }

    /// Persists one event.
    ///
    /// `produce` materializes the payload and is invoked exactly once, by
    /// the mailbox, when the write executes — never at submission. Callers
    /// holding an expensive-to-build message pass the recipe, not the
    /// value.
    pub fn write<F>(&self, when: Timestamp, offset: SourceOffset, produce: F) -> Reply<()>
    where
        F: FnOnce() -> M + Send + 'static,
    {
        self.submit("write", move |reply| Command::Write {
            when,
            offset,
            produce: Box::new(produce),
            reply,
        })
    }

    /// Flushes and closes the writer.
    ///
    /// An ordinary ordered request: every write accepted before it applies
    /// first. Idempotency is the writer's; repeated closes are forwarded.
    /// After a close has been processed, later non-close requests fail with
    /// [`SinkError::Closed`].
    pub fn close(&self) -> Reply<()> {
        self.submit("close", |reply| Command::Close { reply })
    }

    /// Drops one partition's state, e.g. when the partition is reassigned
    /// away during a rebalance.
    pub fn drop_partition(&self, partition: PartitionId) -> Reply<()> {
        self.submit("drop_partition", move |reply| Command::DropPartition {
            partition,
            reply,
        })
    }

    /// Sweeps idle per-partition resources held by the writer. Callers
    /// trigger this on their own schedule; the sink never does.
    pub fn expire_consumers(&self) -> Reply<()> {
        self.submit("expire_consumers", |reply| Command::ExpireConsumers { reply })
    }

    /// Fetches the offset each requested partition should resume from.
    ///
    /// Partitions with no recorded offset may be absent from the result.
    pub fn starting_offsets(
        &self,
        partitions: BTreeSet<PartitionId>,
    ) -> Reply<HashMap<PartitionId, Offset>> {
        self.submit("starting_offsets", move |reply| Command::StartingOffsets {
            partitions,
            reply,
        })
    }

    /// Records a liveness/progress marker for a partition without
    /// persisting a payload.
    pub fn heartbeat(&self, partition: PartitionId, offset: Offset) -> Reply<()> {
        self.submit("heartbeat", move |reply| Command::Heartbeat {
            partition,
            offset,
            reply,
        })
    }

    fn submit<T>(
        &self,
        operation: &'static str,
        build: impl FnOnce(oneshot::Sender<SinkResult<T>>) -> Command<M>,
    ) -> Reply<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(build(reply_tx)) {
            // Mailbox gone; fail the reply instead of the submission.
            cmd.reject(SinkError::MailboxStopped);
        }
        Reply::new(operation, reply_rx, self.reply_timeout)
    }
}

impl<M> Clone for AsyncPartitionedWriter<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            reply_timeout: self.reply_timeout,
        }
    }
}

impl<M> fmt::Debug for AsyncPartitionedWriter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPartitionedWriter")
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

/// Write-once completion of one submitted request.
///
/// Resolves when the mailbox answers: `Ok` with the operation's result, or
/// `Err` if the writer raised, the mailbox was closed or stopped, or the
/// configured deadline elapsed. Dropping a `Reply` abandons the answer but
/// not the request — once accepted, a request executes regardless.
#[must_use = "a Reply does nothing unless awaited"]
pub struct Reply<T> {
    operation: &'static str,
    rx: oneshot::Receiver<SinkResult<T>>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<T> Reply<T> {
    pub(crate) fn new(
        operation: &'static str,
        rx: oneshot::Receiver<SinkResult<T>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            operation,
            rx,
            deadline: timeout.map(|t| Box::pin(tokio::time::sleep(t))),
        }
    }
}

impl<T> Future for Reply<T> {
    type Output = SinkResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Poll::Ready(reply) = Pin::new(&mut this.rx).poll(cx) {
            return Poll::Ready(match reply {
                Ok(result) => result,
                // The mailbox dropped the sender without answering: it
                // stopped (or its task died) with this request in flight.
                Err(_) => Err(SinkError::MailboxStopped),
            });
        }

        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(SinkError::Timeout {
                    operation: this.operation,
                }));
            }
        }

        Poll::Pending
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("operation", &self.operation)
            .field("has_deadline", &self.deadline.is_some())
            .finish_non_exhaustive()
    }
}
