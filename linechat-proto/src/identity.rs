//! Self-reported peer identities.

use std::fmt;

/// A peer's self-reported network identity: the `(host, port)` pair it
/// announces during the join handshake.
///
/// The relay never invents identities; it only records what the client
/// claims. Ordering is lexicographic on `(host, port)` so registry snapshots
/// and fan-out iterate in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerIdentity {
    /// Announced host (usually `127.0.0.1`).
    pub host: String,
    /// Announced listening port.
    pub port: u16,
}

impl PeerIdentity {
    /// Creates an identity from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Name used for a peer that never announced a username: `[host:port]`.
    #[must_use]
    pub fn fallback_name(&self) -> String {
        format!("[{self}]")
    }

    /// Renders the name a message is attributed to.
    #[must_use]
    pub fn display_name(&self, username: Option<&str>) -> String {
        username.map_or_else(|| self.fallback_name(), str::to_string)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
