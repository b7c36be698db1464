//! Relay wire protocol types.
//!
//! Defines [`Request`] (client to relay) and [`ServerLine`] (relay to
//! client). Every value renders to exactly one line via [`fmt::Display`] and
//! parses back via [`FromStr`]; the terminator is added by the line codec.
//!
//! ```text
//! client -> relay   request=join <host> <port> [<username>]
//!                   request=msg <host> <port> <text>
//!                   \q
//! relay -> client   response=accept
//!                   response=reject reason=<reason>
//!                   response=accepted seq=<n>
//!                   msg <who>: <text>
//!                   history <who>: <text>
//! ```

use std::fmt;
use std::str::FromStr;

use crate::identity::PeerIdentity;

/// Token a client sends to leave the relay.
pub const QUIT_TOKEN: &str = "\\q";

const JOIN_VERB: &str = "request=join";
const MSG_VERB: &str = "request=msg";
const ACCEPT: &str = "response=accept";
const REJECT: &str = "response=reject";
const ACCEPTED: &str = "response=accepted";
const MSG_PREFIX: &str = "msg";
const HISTORY_PREFIX: &str = "history";

/// Errors produced when a line does not match the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line was empty.
    #[error("empty line")]
    Empty,
    /// The leading verb is not a known request or response.
    #[error("unknown line kind `{0}`")]
    UnknownKind(String),
    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// The port is not a non-zero `u16`.
    #[error("invalid port `{0}`")]
    InvalidPort(String),
    /// The acknowledgment carried an unparseable sequence number.
    #[error("invalid sequence number `{0}`")]
    InvalidSequence(String),
    /// The reject line carried an unknown reason.
    #[error("unknown reject reason `{0}`")]
    UnknownReason(String),
    /// Extra tokens followed a complete line.
    #[error("unexpected trailing input `{0}`")]
    TrailingInput(String),
}

// ---------------------------------------------------------------------------
// Client -> relay
// ---------------------------------------------------------------------------

/// A line sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Join handshake carrying the client's announced identity.
    Join {
        /// Announced `(host, port)`.
        identity: PeerIdentity,
        /// Optional display name; must not contain whitespace.
        username: Option<String>,
    },
    /// A chat message. The relay attributes it to the identity registered
    /// on the connection, not to the one written in the line.
    Msg {
        /// Identity the client claims to send from.
        identity: PeerIdentity,
        /// Message text (the remainder of the line).
        text: String,
    },
    /// Explicit quit.
    Quit,
}

impl Request {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Msg { .. } => "msg",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join { identity, username } => {
                write!(f, "{JOIN_VERB} {} {}", identity.host, identity.port)?;
                if let Some(name) = username {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
            Self::Msg { identity, text } => {
                write!(f, "{MSG_VERB} {} {} {text}", identity.host, identity.port)
            }
            Self::Quit => f.write_str(QUIT_TOKEN),
        }
    }
}

impl FromStr for Request {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line == QUIT_TOKEN {
            return Ok(Self::Quit);
        }

        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            JOIN_VERB => parse_join(rest),
            MSG_VERB => parse_msg(rest),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

fn parse_join(rest: &str) -> Result<Request, ParseError> {
    let mut fields = rest.split_whitespace();
    let host = fields.next().ok_or(ParseError::MissingField("host"))?;
    let port = parse_port(fields.next().ok_or(ParseError::MissingField("port"))?)?;
    let username = fields.next().map(str::to_string);
    let trailing: Vec<&str> = fields.collect();
    if !trailing.is_empty() {
        return Err(ParseError::TrailingInput(trailing.join(" ")));
    }
    Ok(Request::Join {
        identity: PeerIdentity::new(host, port),
        username,
    })
}

fn parse_msg(rest: &str) -> Result<Request, ParseError> {
    let (host, rest) = next_field(rest, "host")?;
    let (port, text) = next_field(rest, "port")?;
    let port = parse_port(port)?;
    if text.is_empty() {
        return Err(ParseError::MissingField("text"));
    }
    Ok(Request::Msg {
        identity: PeerIdentity::new(host, port),
        text: text.to_string(),
    })
}

/// Splits off one space-delimited field, leaving the remainder untouched.
fn next_field<'a>(input: &'a str, name: &'static str) -> Result<(&'a str, &'a str), ParseError> {
    let (field, rest) = input.split_once(' ').unwrap_or((input, ""));
    if field.is_empty() {
        return Err(ParseError::MissingField(name));
    }
    Ok((field, rest))
}

fn parse_port(field: &str) -> Result<u16, ParseError> {
    field
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ParseError::InvalidPort(field.to_string()))
}

// ---------------------------------------------------------------------------
// Relay -> client
// ---------------------------------------------------------------------------

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Another active session already holds the announced identity.
    DuplicateIdentity,
    /// The join line did not parse.
    MalformedRequest,
}

impl RejectReason {
    /// Wire spelling of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateIdentity => "duplicate-identity",
            Self::MalformedRequest => "malformed-request",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectReason {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate-identity" => Ok(Self::DuplicateIdentity),
            "malformed-request" => Ok(Self::MalformedRequest),
            other => Err(ParseError::UnknownReason(other.to_string())),
        }
    }
}

/// A line sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// The request was accepted (join admitted, or message received).
    Accept,
    /// The join was refused; the relay closes the connection afterwards.
    Reject {
        /// Why the join was refused.
        reason: RejectReason,
    },
    /// The message was appended to the history log.
    Accepted {
        /// Sequence number assigned to the history entry.
        sequence: u64,
    },
    /// A live message relayed from another peer.
    Message {
        /// Sender's username, or `[host:port]`.
        from: String,
        /// Message text.
        text: String,
    },
    /// A history entry replayed right after the join was accepted.
    History {
        /// Sender's username, or `[host:port]`.
        from: String,
        /// Message text.
        text: String,
    },
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str(ACCEPT),
            Self::Reject { reason } => write!(f, "{REJECT} reason={reason}"),
            Self::Accepted { sequence } => write!(f, "{ACCEPTED} seq={sequence}"),
            Self::Message { from, text } => write!(f, "{MSG_PREFIX} {from}: {text}"),
            Self::History { from, text } => write!(f, "{HISTORY_PREFIX} {from}: {text}"),
        }
    }
}

impl FromStr for ServerLine {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (kind, rest) = line.split_once(' ').unwrap_or((line, ""));
        match kind {
            ACCEPT => expect_end(rest).map(|()| Self::Accept),
            REJECT => {
                let value = rest
                    .strip_prefix("reason=")
                    .ok_or(ParseError::MissingField("reason"))?;
                Ok(Self::Reject {
                    reason: value.parse()?,
                })
            }
            ACCEPTED => {
                let value = rest
                    .strip_prefix("seq=")
                    .ok_or(ParseError::MissingField("seq"))?;
                let sequence = value
                    .parse()
                    .map_err(|_| ParseError::InvalidSequence(value.to_string()))?;
                Ok(Self::Accepted { sequence })
            }
            MSG_PREFIX => {
                let (from, text) = split_attributed(rest)?;
                Ok(Self::Message { from, text })
            }
            HISTORY_PREFIX => {
                let (from, text) = split_attributed(rest)?;
                Ok(Self::History { from, text })
            }
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

fn expect_end(rest: &str) -> Result<(), ParseError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::TrailingInput(rest.to_string()))
    }
}

/// Splits `<who>: <text>`. Names never contain whitespace, so the first
/// `": "` always ends the name.
fn split_attributed(rest: &str) -> Result<(String, String), ParseError> {
    let (from, text) = rest
        .split_once(": ")
        .ok_or(ParseError::MissingField("text"))?;
    if from.is_empty() {
        return Err(ParseError::MissingField("from"));
    }
    Ok((from.to_string(), text.to_string()))
}
