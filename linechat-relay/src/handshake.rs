//! Join handshake: turns a fresh connection into an active session.
//!
//! The first line on every connection must be a join request. On success the
//! peer is registered, told `response=accept`, sent the history replay, and
//! activated. All of that happens under the relay's sequencing lock, so no
//! live message can slip in between the replay and activation.

use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::{ParseError, RejectReason, Request, ServerLine};

use crate::audit;
use crate::registry::{Outbox, RegistryError, SessionHandle};
use crate::relay::RelayState;

/// Why a join did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// The first line did not parse.
    #[error("malformed join request: {0}")]
    Malformed(#[from] ParseError),
    /// The first line parsed but was not a join.
    #[error("expected join request, got {0}")]
    NotAJoin(&'static str),
    /// The identity is already held by a live session.
    #[error(transparent)]
    Rejected(#[from] RegistryError),
    /// The connection's outbox closed before the accept could be queued.
    #[error("connection closed during join")]
    ConnectionGone,
}

impl JoinError {
    /// Reason reported to the client, or `None` when nobody is left to
    /// tell.
    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Malformed(_) | Self::NotAJoin(_) => Some(RejectReason::MalformedRequest),
            Self::Rejected(RegistryError::DuplicateIdentity(_)) => {
                Some(RejectReason::DuplicateIdentity)
            }
            Self::ConnectionGone => None,
        }
    }
}

/// Parses the first line of a connection as a join request.
///
/// # Errors
///
/// Returns [`JoinError::Malformed`] or [`JoinError::NotAJoin`].
pub fn parse_join(line: &str) -> Result<(PeerIdentity, Option<String>), JoinError> {
    match line.parse::<Request>()? {
        Request::Join { identity, username } => Ok((identity, username)),
        other => Err(JoinError::NotAJoin(other.kind())),
    }
}

/// Runs the server side of the join handshake for one connection.
///
/// `outbox` becomes the session's delivery queue. On success it already
/// holds `response=accept` followed by one `history` line per entry.
///
/// # Errors
///
/// Returns a [`JoinError`]; nothing is registered in that case and the
/// caller replies `response=reject` and closes the connection.
pub async fn join(
    state: &RelayState,
    first_line: &str,
    outbox: Outbox,
) -> Result<SessionHandle, JoinError> {
    let (identity, username) = parse_join(first_line).inspect_err(|e| {
        audit::join_malformed(first_line);
        tracing::warn!(line = %first_line, error = %e, "rejecting malformed join");
    })?;
    admit(state, identity, username, outbox).await
}

/// Registers a parsed join and replays history to it alone.
///
/// # Errors
///
/// Returns [`JoinError::Rejected`] on an identity collision, or
/// [`JoinError::ConnectionGone`] if `outbox` is already closed. Either way
/// the registry is left as it was.
pub async fn admit(
    state: &RelayState,
    identity: PeerIdentity,
    username: Option<String>,
    outbox: Outbox,
) -> Result<SessionHandle, JoinError> {
    let order = state.sequence().await;

    let handle = match state
        .registry
        .register(identity.clone(), username, outbox.clone())
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            drop(order);
            audit::join_rejected(&identity, RejectReason::DuplicateIdentity);
            return Err(e.into());
        }
    };

    let replay = state.history.snapshot().await;
    let queued = outbox.send(ServerLine::Accept).is_ok()
        && replay
            .iter()
            .all(|entry| outbox.send(entry.replay_line()).is_ok());
    if !queued {
        state.registry.deregister(&handle).await;
        drop(order);
        tracing::debug!(
            peer = %identity,
            session = %handle.id,
            "outbox closed during join, abandoning session"
        );
        return Err(JoinError::ConnectionGone);
    }

    audit::join_accepted(&identity);
    state.registry.activate(&handle).await;
    drop(order);

    tracing::info!(
        peer = %identity,
        session = %handle.id,
        replayed = replay.len(),
        "peer joined"
    );
    Ok(handle)
}
