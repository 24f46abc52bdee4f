//! Sink configuration.

use std::time::Duration;

/// Configuration for one façade/mailbox pair.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Deadline for each request-reply exchange. `None` — the default —
    /// means a reply is awaited forever; real timeout/retry policy belongs
    /// to the caller layer. An already-dequeued request cannot be
    /// cancelled; on expiry only the reply fails.
    pub reply_timeout: Option<Duration>,

    /// Name used in log events, to tell sinks apart when several share a
    /// process.
    pub name: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            reply_timeout: None,
            name: "vellum-sink".to_owned(),
        }
    }
}

impl SinkConfig {
    /// Creates the default configuration: no reply deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a per-request reply deadline.
    ///
    /// Replies not received in time fail with
    /// [`SinkError::Timeout`](crate::SinkError::Timeout). Requires a
    /// timer-enabled tokio runtime at submission time.
    #[must_use]
    pub const fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Sets the sink name used in log events.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
