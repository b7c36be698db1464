//! Disconnect handling.
//!
//! A peer leaves either by sending the quit token or by its connection
//! failing. Both feed the same transition (`Active -> Closed`), which happens
//! at most once per session no matter how many times it is triggered.

use std::fmt;

use crate::audit;
use crate::registry::{PeerSession, SessionHandle};
use crate::relay::RelayState;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The peer sent the quit token.
    Explicit,
    /// A read or write on the peer's connection hit end-of-stream or failed.
    ConnectionLost,
}

impl DisconnectCause {
    /// Spelling used in the audit log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::ConnectionLost => "connection-lost",
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deregisters a session and records its closure.
///
/// Returns the closed session the first time; later calls for the same
/// handle are no-ops returning `None` and log nothing.
pub async fn disconnect(
    state: &RelayState,
    handle: &SessionHandle,
    cause: DisconnectCause,
) -> Option<PeerSession> {
    let Some(closed) = state.registry.deregister(handle).await else {
        tracing::debug!(
            peer = %handle.identity,
            session = %handle.id,
            cause = %cause,
            "session already closed"
        );
        return None;
    };
    audit::closed(&closed.identity, cause);
    Some(closed)
}
