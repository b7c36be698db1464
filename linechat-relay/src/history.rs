//! Append-only, in-memory log of every accepted message since start.
//!
//! The [`HistoryLog`] assigns each message a sequence number and keeps it for
//! the lifetime of the process. Peers that join later receive a snapshot of
//! the log, replayed in sequence order. There is no eviction.

use std::sync::Arc;

use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::ServerLine;
use tokio::sync::RwLock;

/// One accepted message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Position in the global order, starting at 1.
    pub sequence: u64,
    /// Identity of the sender at the time of sending.
    pub sender: PeerIdentity,
    /// Sender's username, if it announced one.
    pub username: Option<String>,
    /// Message text.
    pub text: String,
}

impl HistoryEntry {
    /// Name this entry is attributed to.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.sender.display_name(self.username.as_deref())
    }

    /// Line pushed live to other peers.
    #[must_use]
    pub fn live_line(&self) -> ServerLine {
        ServerLine::Message {
            from: self.display_name(),
            text: self.text.clone(),
        }
    }

    /// Line sent when replaying history to a newly joined peer.
    #[must_use]
    pub fn replay_line(&self) -> ServerLine {
        ServerLine::History {
            from: self.display_name(),
            text: self.text.clone(),
        }
    }
}

/// Ordered record of accepted messages.
///
/// Thread-safe via [`RwLock`]. Entries are shared as `Arc` so snapshots
/// reference them rather than copying.
#[derive(Default)]
pub struct HistoryLog {
    entries: RwLock<Vec<Arc<HistoryEntry>>>,
}

impl HistoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns the stored entry.
    ///
    /// Sequence numbers are assigned under the write lock, so concurrent
    /// appends are linearized here.
    pub async fn append(
        &self,
        sender: PeerIdentity,
        username: Option<String>,
        text: String,
    ) -> Arc<HistoryEntry> {
        let mut entries = self.entries.write().await;
        let entry = Arc::new(HistoryEntry {
            sequence: entries.len() as u64 + 1,
            sender,
            username,
            text,
        });
        entries.push(Arc::clone(&entry));
        drop(entries);
        entry
    }

    /// Returns every entry appended before this call, in sequence order.
    pub async fn snapshot(&self) -> Vec<Arc<HistoryEntry>> {
        self.entries.read().await.clone()
    }

    /// Number of entries in the log.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing has been appended yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
