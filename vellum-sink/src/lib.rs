//! Vellum Sink - serialized async front-end over a partitioned writer.
//!
//! The durable-sink layer of a telemetry pipeline: events consumed from
//! source shards are persisted, per partition, by a stateful writer. The
//! writer is not safe to share, so every mutating operation is funneled
//! through a single ordered execution lane — the mailbox — and callers get
//! a future per request instead of a lock.
//!
//! # Design
//!
//! ```text
//! caller A ──┐
//!            │    ┌──────────────────────┐
//! caller B ──┼───►│ AsyncPartitionedWriter│──► mailbox ──► PartitionedWriter
//!            │    │  (clone-able handle)  │   (one task,    (exclusively
//! caller C ──┘    └──────────────────────┘    FIFO, one      owned, one
//!                                             call at a      call in
//!                                             time)          flight)
//! ```
//!
//! Each façade method builds a command carrying a oneshot reply sender,
//! submits it at call time, and returns a [`Reply`] future. The mailbox
//! executes commands strictly in acceptance order and converts writer
//! errors into failed replies without ever stopping: one partition's
//! failure must not block unrelated partitions sharing the writer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod facade;
mod mailbox;
mod simulated;
mod writer;

pub use config::SinkConfig;
pub use error::{SinkError, SinkResult, WriterError, WriterResult};
pub use facade::{AsyncPartitionedWriter, Reply};
pub use simulated::{FaultPlan, SimulatedWriter, WriterCall};
pub use writer::PartitionedWriter;
