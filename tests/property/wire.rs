// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests for the line protocol.
//!
//! Uses proptest to verify:
//! 1. Arbitrary input never panics either parser (they return `Err`).
//! 2. Any well-formed `Request` renders to a line that parses back to it.
//! 3. Any well-formed `ServerLine` renders to a line that parses back to it.
//! 4. Rendered lines survive the newline codec unchanged.

use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

use linechat_proto::codec;
use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::{RejectReason, Request, ServerLine};

// --- Strategies for protocol types ---

/// Hosts are single tokens.
fn arb_identity() -> impl Strategy<Value = PeerIdentity> {
    ("[a-z0-9][a-z0-9.-]{0,30}", 1..=u16::MAX).prop_map(|(host, port)| PeerIdentity::new(host, port))
}

/// Usernames are single words.
fn arb_username() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z0-9_]{1,16}")
}

/// Message text: anything on one line, at least one character.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\r\n]{0,200}[^\r\n]".prop_map(String::from)
}

/// Attributed sender names: a username or `[host:port]`.
fn arb_sender() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_]{1,16}".prop_map(String::from),
        arb_identity().prop_map(|id| id.fallback_name()),
    ]
}

fn arb_request() -> impl Strategy<Value = Request> {
    prop_oneof![
        (arb_identity(), arb_username())
            .prop_map(|(identity, username)| Request::Join { identity, username }),
        (arb_identity(), arb_text()).prop_map(|(identity, text)| Request::Msg { identity, text }),
        Just(Request::Quit),
    ]
}

fn arb_server_line() -> impl Strategy<Value = ServerLine> {
    prop_oneof![
        Just(ServerLine::Accept),
        prop_oneof![
            Just(RejectReason::DuplicateIdentity),
            Just(RejectReason::MalformedRequest)
        ]
        .prop_map(|reason| ServerLine::Reject { reason }),
        any::<u64>().prop_map(|sequence| ServerLine::Accepted { sequence }),
        (arb_sender(), arb_text()).prop_map(|(from, text)| ServerLine::Message { from, text }),
        (arb_sender(), arb_text()).prop_map(|(from, text)| ServerLine::History { from, text }),
    ]
}

// --- Properties ---

proptest! {
    #[test]
    fn request_parser_never_panics(line in any::<String>()) {
        let _ = line.parse::<Request>();
    }

    #[test]
    fn server_line_parser_never_panics(line in any::<String>()) {
        let _ = line.parse::<ServerLine>();
    }

    #[test]
    fn request_round_trips(request in arb_request()) {
        let line = request.to_string();
        prop_assert!(!line.contains('\n'));
        prop_assert_eq!(line.parse::<Request>().unwrap(), request);
    }

    #[test]
    fn server_line_round_trips(server_line in arb_server_line()) {
        let line = server_line.to_string();
        prop_assert_eq!(line.parse::<ServerLine>().unwrap(), server_line);
    }

    #[test]
    fn rendered_lines_survive_framing(request in arb_request()) {
        let mut codec = codec::line_codec(codec::DEFAULT_MAX_LINE_LENGTH);
        let mut buf = BytesMut::new();
        codec.encode(request.to_string(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().expect("one full line");
        prop_assert_eq!(decoded.parse::<Request>().unwrap(), request);
        prop_assert!(buf.is_empty());
    }
}
