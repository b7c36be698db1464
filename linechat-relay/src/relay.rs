//! Relay core: shared state and the message relay path.
//!
//! [`RelayState`] owns the two pieces of shared mutable state, the
//! [`ConnectionRegistry`] and the [`HistoryLog`], and is passed by `Arc` to
//! every connection task. [`RelayState::submit`] moves one message from a
//! sender into the log and out to every other active peer.

use std::time::Duration;

use linechat_proto::codec::DEFAULT_MAX_LINE_LENGTH;
use tokio::sync::{Mutex, MutexGuard};

use crate::disconnect::{self, DisconnectCause};
use crate::history::HistoryLog;
use crate::registry::{ConnectionRegistry, SessionHandle};

/// How long a quitting peer's queued lines may take to flush.
pub const DEFAULT_QUIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Acknowledgment for a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Sequence number of the new history entry.
    pub sequence: u64,
    /// Number of peers the message was queued for.
    pub delivered: usize,
}

/// Errors returned by [`RelayState::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The sender is no longer an active session; the message is dropped.
    #[error("sender {0} is not an active session")]
    NotActive(String),
}

/// Shared relay state: the connection registry and the history log.
pub struct RelayState {
    /// Live sessions keyed by announced identity.
    pub registry: ConnectionRegistry,
    /// Every accepted message since start.
    pub history: HistoryLog,
    /// Held across append + fan-out and across register + replay, so every
    /// peer observes one total order and a joining peer sees each message
    /// either in its replay or live, never both.
    sequencer: Mutex<()>,
    /// Maximum accepted line length in bytes.
    max_line_length: usize,
    /// Bound on flushing a session's queue after it quits.
    quit_flush_timeout: Duration,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates an empty relay state with the default line length limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates an empty relay state with a custom line length limit.
    #[must_use]
    pub fn with_config(max_line_length: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: HistoryLog::new(),
            sequencer: Mutex::new(()),
            max_line_length,
            quit_flush_timeout: DEFAULT_QUIT_FLUSH_TIMEOUT,
        }
    }

    /// Sets how long a quitting peer's queued lines may take to flush.
    #[must_use]
    pub fn with_quit_flush_timeout(mut self, timeout: Duration) -> Self {
        self.quit_flush_timeout = timeout;
        self
    }

    /// Maximum accepted line length in bytes.
    #[must_use]
    pub const fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Bound on flushing a session's queue after it quits.
    #[must_use]
    pub const fn quit_flush_timeout(&self) -> Duration {
        self.quit_flush_timeout
    }

    pub(crate) async fn sequence(&self) -> MutexGuard<'_, ()> {
        self.sequencer.lock().await
    }

    /// Accepts a message from `sender`, appends it to the history log, and
    /// queues it for every other active peer.
    ///
    /// The acknowledgment covers the append only; delivery to recipients is
    /// best effort. Recipients whose connection is gone are routed through
    /// the disconnect path and do not affect the sender.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::NotActive`] if the sender raced with its own
    /// disconnect. Nothing is appended in that case.
    pub async fn submit(&self, sender: &SessionHandle, text: String) -> Result<Ack, SubmitError> {
        let order = self.sequence().await;
        if !self.registry.is_active(sender).await {
            return Err(SubmitError::NotActive(sender.identity.to_string()));
        }

        let entry = self
            .history
            .append(sender.identity.clone(), sender.username.clone(), text)
            .await;
        let outcome = self
            .registry
            .broadcast(&sender.identity, &entry.live_line())
            .await;
        drop(order);

        tracing::debug!(
            from = %sender.identity,
            seq = entry.sequence,
            delivered = outcome.delivered,
            failed = outcome.failed.len(),
            "message relayed"
        );

        for lost in &outcome.failed {
            tracing::warn!(peer = %lost.identity, "recipient queue closed, disconnecting");
            disconnect::disconnect(self, lost, DisconnectCause::ConnectionLost).await;
        }

        Ok(Ack {
            sequence: entry.sequence,
            delivered: outcome.delivered,
        })
    }
}
