//! Connection registry: the authoritative set of live peer sessions.
//!
//! Sessions are keyed by the identity the peer announced at join time. The
//! registry is the only place session state changes; every other component
//! asks it whether a peer is still here instead of tracking that itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::ServerLine;
use tokio::sync::{RwLock, mpsc};

/// Sender half of a session's outbound line queue. The connection's writer
/// task owns the receiving half.
pub type Outbox = mpsc::UnboundedSender<ServerLine>;

/// Unique id assigned to every registration, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a peer session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered; history replay not yet queued.
    Joining,
    /// Eligible to send and receive relayed messages.
    Active,
    /// Removed from the registry.
    Closed,
}

/// Server-side state for one connected peer.
#[derive(Debug)]
pub struct PeerSession {
    /// Registration id.
    pub id: SessionId,
    /// Announced identity.
    pub identity: PeerIdentity,
    /// Optional display name from the join request.
    pub username: Option<String>,
    /// Current lifecycle state.
    pub state: SessionState,
    outbox: Outbox,
}

impl PeerSession {
    fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            identity: self.identity.clone(),
            username: self.username.clone(),
        }
    }
}

/// Cheap reference to a registered session, held by its connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Registration id; distinguishes this session from a later one that
    /// reuses the same identity.
    pub id: SessionId,
    /// Announced identity.
    pub identity: PeerIdentity,
    /// Optional display name.
    pub username: Option<String>,
}

impl SessionHandle {
    /// Name messages from this session are attributed to.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.identity.display_name(self.username.as_deref())
    }
}

/// Errors returned by [`ConnectionRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another live session already holds this identity.
    #[error("identity {0} is already joined")]
    DuplicateIdentity(PeerIdentity),
}

/// Result of fanning one line out to the registry.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    /// Number of recipients the line was queued for.
    pub delivered: usize,
    /// Recipients whose connection is gone; the caller routes these
    /// through the disconnect path.
    pub failed: Vec<SessionHandle>,
}

/// Concurrent map from [`PeerIdentity`] to [`PeerSession`].
///
/// Thread-safe via [`RwLock`]: fan-out takes the read lock so concurrent
/// broadcasts do not block each other, while register/deregister take the
/// write lock briefly. The map is ordered, so iteration is stable.
pub struct ConnectionRegistry {
    sessions: RwLock<BTreeMap<PeerIdentity, PeerSession>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new session in the `Joining` state.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateIdentity`] if the identity is
    /// already held by a live session. The existing session is untouched.
    pub async fn register(
        &self,
        identity: PeerIdentity,
        username: Option<String>,
        outbox: Outbox,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&identity) {
            return Err(RegistryError::DuplicateIdentity(identity));
        }

        let session = PeerSession {
            id: SessionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            identity: identity.clone(),
            username,
            state: SessionState::Joining,
            outbox,
        };
        let handle = session.handle();
        sessions.insert(identity, session);
        drop(sessions);

        Ok(handle)
    }

    /// Moves a session from `Joining` to `Active`.
    ///
    /// Returns `false` if the session is no longer registered.
    pub async fn activate(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&handle.identity) {
            Some(session) if session.id == handle.id => {
                session.state = SessionState::Active;
                true
            }
            _ => false,
        }
    }

    /// Removes a session, marking it `Closed`.
    ///
    /// Idempotent: returns `None` when the session was already removed, or
    /// when the identity now belongs to a different, later session.
    pub async fn deregister(&self, handle: &SessionHandle) -> Option<PeerSession> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(&handle.identity)?.id != handle.id {
            return None;
        }
        let mut session = sessions.remove(&handle.identity)?;
        drop(sessions);
        session.state = SessionState::Closed;
        Some(session)
    }

    /// Returns `true` if the handle refers to a currently `Active` session.
    pub async fn is_active(&self, handle: &SessionHandle) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(&handle.identity)
            .is_some_and(|s| s.id == handle.id && s.state == SessionState::Active)
    }

    /// Returns the state of whatever session currently holds `identity`.
    pub async fn state_of(&self, identity: &PeerIdentity) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(identity).map(|s| s.state)
    }

    /// Queues `line` for every `Active` session except `except`.
    ///
    /// A recipient whose queue is closed does not stop delivery to the
    /// others; it is reported in [`BroadcastOutcome::failed`].
    pub async fn broadcast(&self, except: &PeerIdentity, line: &ServerLine) -> BroadcastOutcome {
        let sessions = self.sessions.read().await;
        let mut outcome = BroadcastOutcome::default();
        for (identity, session) in sessions.iter() {
            if identity == except || session.state != SessionState::Active {
                continue;
            }
            if session.outbox.send(line.clone()).is_ok() {
                outcome.delivered += 1;
            } else {
                outcome.failed.push(session.handle());
            }
        }
        drop(sessions);
        outcome
    }

    /// Identities of all registered sessions, in stable order.
    pub async fn snapshot(&self) -> Vec<PeerIdentity> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
