//! Audit trail of joins, messages, and closures.
//!
//! These INFO lines are the relay's externally visible record and their text
//! is kept stable for tooling that scrapes the log:
//!
//! ```text
//! request=join 127.0.0.1 9000 response=accept
//! request=join 127.0.0.1 9000 response=reject reason=duplicate-identity
//! request=join 127.0.0.1 0 response=reject reason=malformed-request
//! request=msg 127.0.0.1 9000 response=accept
//! request=msg 127.0.0.1 9000 response=accepted seq=4
//! close 127.0.0.1:9000 cause=explicit
//! ```
//!
//! Each line also carries `host` and `port` as structured fields.

use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::RejectReason;

use crate::disconnect::DisconnectCause;

/// Formats the audit line for a join decision.
#[must_use]
pub fn join_line(identity: &PeerIdentity, rejected: Option<RejectReason>) -> String {
    let PeerIdentity { host, port } = identity;
    match rejected {
        None => format!("request=join {host} {port} response=accept"),
        Some(reason) => format!("request=join {host} {port} response=reject reason={reason}"),
    }
}

/// Formats the audit line for a first line that is not a valid join. The
/// raw fields are echoed as received.
#[must_use]
pub fn malformed_join_line(first_line: &str) -> String {
    let reason = RejectReason::MalformedRequest;
    match join_fields(first_line) {
        "" => format!("request=join response=reject reason={reason}"),
        fields => format!("request=join {fields} response=reject reason={reason}"),
    }
}

fn join_fields(first_line: &str) -> &str {
    first_line
        .strip_prefix("request=join")
        .unwrap_or(first_line)
        .trim()
}

/// Formats the audit line for a message; `sequence` is set once the
/// message has been appended to the history log.
#[must_use]
pub fn msg_line(identity: &PeerIdentity, sequence: Option<u64>) -> String {
    let PeerIdentity { host, port } = identity;
    match sequence {
        None => format!("request=msg {host} {port} response=accept"),
        Some(seq) => format!("request=msg {host} {port} response=accepted seq={seq}"),
    }
}

/// Formats the audit line for a closed session.
#[must_use]
pub fn close_line(identity: &PeerIdentity, cause: DisconnectCause) -> String {
    format!("close {identity} cause={cause}")
}

fn record(identity: &PeerIdentity, line: &str) {
    tracing::info!(host = %identity.host, port = identity.port, "{line}");
}

/// Records an accepted join.
pub fn join_accepted(identity: &PeerIdentity) {
    record(identity, &join_line(identity, None));
}

/// Records a rejected join.
pub fn join_rejected(identity: &PeerIdentity, reason: RejectReason) {
    record(identity, &join_line(identity, Some(reason)));
}

/// Records a join refused because its first line did not parse. `host` and
/// `port` are attached when those two fields are readable.
pub fn join_malformed(first_line: &str) {
    let line = malformed_join_line(first_line);
    let mut fields = join_fields(first_line).split_whitespace();
    match (fields.next(), fields.next().and_then(|p| p.parse::<u16>().ok())) {
        (Some(host), Some(port)) => tracing::info!(host = %host, port, "{line}"),
        _ => tracing::info!("{line}"),
    }
}

/// Records a message acceptance and its acknowledgment.
pub fn msg_accepted(identity: &PeerIdentity, sequence: u64) {
    record(identity, &msg_line(identity, None));
    record(identity, &msg_line(identity, Some(sequence)));
}

/// Records a session closure.
pub fn closed(identity: &PeerIdentity, cause: DisconnectCause) {
    record(identity, &close_line(identity, cause));
}
