//! Client side of a relay connection.
//!
//! [`ClientSession::connect`] performs the join handshake. [`spawn_session`]
//! then splits the connection into two independent tasks and hands back
//! [`ClientCommand`] / [`ClientEvent`] channels:
//!
//! ```text
//! caller  ─── ClientCommand ──→  outbound task ──→ relay
//! caller  ←── ClientEvent  ───  inbound task  ←── relay
//! ```
//!
//! Neither task waits on the other, so a slow or blocked input source never
//! stalls delivery of relay traffic.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use linechat_proto::codec::{self, DEFAULT_MAX_LINE_LENGTH, LinesCodecError};
use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::{ParseError, QUIT_TOKEN, RejectReason, Request, ServerLine};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

/// Default time allowed for connecting and receiving the join reply.
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default channel capacity for commands and events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors that end a client session before or during the handshake.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The TCP connection to the relay could not be established.
    #[error("failed to connect to relay at {addr}: {source}")]
    Connect {
        /// Relay address that was dialled.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The relay refused the join.
    #[error("relay rejected join: {0}")]
    Rejected(RejectReason),
    /// Connecting or waiting for the join reply took too long.
    #[error("timed out waiting for the relay to answer the join")]
    JoinTimeout,
    /// The relay closed the connection during the handshake.
    #[error("relay closed the connection")]
    ConnectionClosed,
    /// The relay answered with something other than accept/reject.
    #[error("unexpected reply to join: {0}")]
    UnexpectedReply(String),
    /// The relay sent a line that does not parse.
    #[error(transparent)]
    Protocol(#[from] ParseError),
    /// Framing or I/O failure on the connection.
    #[error(transparent)]
    Codec(#[from] LinesCodecError),
}

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Submit a chat message.
    Send(String),
    /// Leave the relay and close the connection.
    Quit,
}

impl ClientCommand {
    /// Maps one line of user input to a command. Blank lines map to `None`.
    #[must_use]
    pub fn from_input(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim() == QUIT_TOKEN {
            return Some(Self::Quit);
        }
        if line.trim().is_empty() {
            return None;
        }
        Some(Self::Send(line.to_string()))
    }
}

/// Events produced by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A history entry replayed after joining.
    History {
        /// Sender name.
        from: String,
        /// Message text.
        text: String,
    },
    /// A live message from another peer.
    Message {
        /// Sender name.
        from: String,
        /// Message text.
        text: String,
    },
    /// The relay logged one of our messages.
    Accepted {
        /// Sequence number assigned by the relay.
        sequence: u64,
    },
    /// The connection ended. No further events follow.
    Closed {
        /// Failure description, or `None` for an orderly close.
        reason: Option<String>,
    },
}

/// Settings for one client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay address as `host:port`.
    pub relay_addr: String,
    /// Identity announced in the join request.
    pub identity: PeerIdentity,
    /// Optional username announced in the join request.
    pub username: Option<String>,
    /// Bound on connecting plus waiting for the join reply.
    pub join_timeout: Duration,
    /// Capacity of the command and event channels.
    pub channel_capacity: usize,
    /// Maximum line length accepted from the relay.
    pub max_line_length: usize,
}

impl SessionConfig {
    /// Creates a session config with default timeouts and capacities.
    #[must_use]
    pub const fn new(relay_addr: String, identity: PeerIdentity) -> Self {
        Self {
            relay_addr,
            identity,
            username: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Sets the username announced at join time.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// A joined connection to the relay.
pub struct ClientSession {
    identity: PeerIdentity,
    framed: Framed<TcpStream, LinesCodec>,
}

impl ClientSession {
    /// Connects to the relay and performs the join handshake.
    ///
    /// Lines the relay sends after `response=accept` (the history replay)
    /// stay buffered for the inbound task.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Connect`] if the relay is unreachable.
    /// - [`ClientError::Rejected`] if the relay refuses the join.
    /// - [`ClientError::JoinTimeout`] if either step exceeds the timeout.
    /// - [`ClientError::ConnectionClosed`], [`ClientError::Protocol`],
    ///   [`ClientError::UnexpectedReply`], or [`ClientError::Codec`] when
    ///   the reply is missing or invalid.
    pub async fn connect(config: &SessionConfig) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(
            config.join_timeout,
            TcpStream::connect(&config.relay_addr),
        )
        .await
        .map_err(|_| ClientError::JoinTimeout)?
        .map_err(|source| ClientError::Connect {
            addr: config.relay_addr.clone(),
            source,
        })?;

        let mut framed = Framed::new(stream, codec::line_codec(config.max_line_length));

        let join = Request::Join {
            identity: config.identity.clone(),
            username: config.username.clone(),
        };
        framed.send(join.to_string()).await?;
        tracing::debug!(relay = %config.relay_addr, line = %join, "sent join request");

        let reply = tokio::time::timeout(config.join_timeout, framed.next())
            .await
            .map_err(|_| ClientError::JoinTimeout)?;

        match reply {
            Some(Ok(line)) => match line.parse::<ServerLine>()? {
                ServerLine::Accept => {
                    tracing::info!(
                        identity = %config.identity,
                        relay = %config.relay_addr,
                        "request=join {} {} response=accept",
                        config.identity.host,
                        config.identity.port
                    );
                }
                ServerLine::Reject { reason } => {
                    tracing::warn!(identity = %config.identity, reason = %reason, "join rejected");
                    return Err(ClientError::Rejected(reason));
                }
                other => return Err(ClientError::UnexpectedReply(other.to_string())),
            },
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::ConnectionClosed),
        }

        Ok(Self {
            identity: config.identity.clone(),
            framed,
        })
    }

    /// Identity this session joined with.
    #[must_use]
    pub const fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Splits the session into its inbound and outbound tasks.
    #[must_use]
    pub fn spawn(
        self,
        channel_capacity: usize,
    ) -> (mpsc::Sender<ClientCommand>, mpsc::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ClientCommand>(channel_capacity);
        let (evt_tx, evt_rx) = mpsc::channel::<ClientEvent>(channel_capacity);
        let (sink, lines) = self.framed.split();

        tokio::spawn(inbound_loop(lines, evt_tx));
        tokio::spawn(outbound_loop(sink, cmd_rx, self.identity));

        (cmd_tx, evt_rx)
    }
}

/// Connects, joins, and spawns the session tasks.
///
/// # Errors
///
/// Returns a [`ClientError`] if the connection or join fails.
pub async fn spawn_session(
    config: SessionConfig,
) -> Result<(mpsc::Sender<ClientCommand>, mpsc::Receiver<ClientEvent>), ClientError> {
    let session = ClientSession::connect(&config).await?;
    Ok(session.spawn(config.channel_capacity))
}

type LineStream = futures_util::stream::SplitStream<Framed<TcpStream, LinesCodec>>;
type LineSink = futures_util::stream::SplitSink<Framed<TcpStream, LinesCodec>, String>;

/// Background task: read relay lines and forward them as events.
async fn inbound_loop(mut lines: LineStream, evt_tx: mpsc::Sender<ClientEvent>) {
    let reason = loop {
        let event = match lines.next().await {
            Some(Ok(line)) => match line.parse::<ServerLine>() {
                Ok(ServerLine::History { from, text }) => ClientEvent::History { from, text },
                Ok(ServerLine::Message { from, text }) => ClientEvent::Message { from, text },
                Ok(ServerLine::Accepted { sequence }) => ClientEvent::Accepted { sequence },
                Ok(ServerLine::Accept) => continue,
                Ok(ServerLine::Reject { reason }) => {
                    tracing::warn!(reason = %reason, "unexpected reject after join");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(line = %line, error = %e, "ignoring malformed relay line");
                    continue;
                }
            },
            Some(Err(e)) => break Some(e.to_string()),
            None => break None,
        };
        if evt_tx.send(event).await.is_err() {
            // Nobody is listening any more.
            return;
        }
    };

    let _ = evt_tx.send(ClientEvent::Closed { reason }).await;
}

/// Background task: turn commands into requests.
///
/// Dropping every command sender is treated like an explicit quit.
async fn outbound_loop(
    mut sink: LineSink,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    identity: PeerIdentity,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            ClientCommand::Send(text) => {
                let request = Request::Msg {
                    identity: identity.clone(),
                    text,
                };
                if let Err(e) = sink.send(request.to_string()).await {
                    tracing::warn!(error = %e, "failed to send message, stopping");
                    return;
                }
            }
            ClientCommand::Quit => break,
        }
    }

    tracing::info!(identity = %identity, "leaving relay");
    if let Err(e) = sink.send(Request::Quit.to_string()).await {
        tracing::debug!(error = %e, "failed to send quit");
    }
    let _ = sink.close().await;
}
