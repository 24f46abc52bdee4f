//! Sink error types.
//!
//! Two layers, two enums: [`WriterError`] is what a concrete writer may
//! raise; [`SinkError`] is what callers of the async façade observe. Every
//! writer error is caught at the mailbox boundary and wrapped — none
//! escalates past the failed request.

use thiserror::Error;

/// Result type for underlying-writer operations.
pub type WriterResult<T> = Result<T, WriterError>;

/// Result type for façade operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors a concrete [`PartitionedWriter`](crate::PartitionedWriter) may raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriterError {
    /// An I/O error from the backing filesystem.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// An event could not be serialized into the file format.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// The writer has already been closed.
    #[error("writer is closed")]
    Closed,
}

impl WriterError {
    /// Creates an I/O error.
    pub fn io(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation,
            message: err.to_string(),
        }
    }
}

/// Errors observed by callers of the async façade.
///
/// `Write` and `Query` carry the writer's own error; the remaining variants
/// are conditions of the mailbox itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The writer raised during write, heartbeat, drop-partition,
    /// expire-consumers or close. The mailbox keeps processing.
    #[error("write-path operation failed: {source}")]
    Write {
        /// The writer's error.
        #[source]
        source: WriterError,
    },

    /// The writer raised during a starting-offsets query. No partial
    /// result is returned.
    #[error("starting-offsets query failed: {source}")]
    Query {
        /// The writer's error.
        #[source]
        source: WriterError,
    },

    /// The configured reply deadline elapsed before the mailbox answered.
    /// Distinct from a writer-raised error: the operation may still execute.
    #[error("timed out waiting for {operation} reply")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },

    /// The request was submitted after the mailbox processed a close.
    #[error("sink is closed")]
    Closed,

    /// The mailbox stopped before accepting or answering the request.
    #[error("sink mailbox has stopped")]
    MailboxStopped,
}

impl SinkError {
    pub(crate) const fn write(source: WriterError) -> Self {
        Self::Write { source }
    }

    pub(crate) const fn query(source: WriterError) -> Self {
        Self::Query { source }
    }

    /// Returns true if the error originated in the underlying writer
    /// rather than in the mailbox machinery.
    #[must_use]
    pub const fn is_writer_error(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Query { .. })
    }
}
