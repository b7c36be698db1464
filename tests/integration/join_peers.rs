// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for joining the relay.
//!
//! Runs an in-process relay on an ephemeral port and drives it with real
//! client sessions and raw TCP peers. Covers:
//! - Two peers joining and both being registered
//! - A duplicate identity being rejected while the original stays joined
//! - Malformed first lines being rejected and the connection closed
//!
//! Verification command: `cargo test --test join_peers`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use linechat::session::{ClientError, SessionConfig, spawn_session};
use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::RejectReason;
use linechat_relay::registry::SessionState;
use linechat_relay::relay::RelayState;
use linechat_relay::server::start_server_with_state;

// =============================================================================
// Test helpers
// =============================================================================

async fn start_relay() -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("relay should bind");
    (addr, state)
}

fn session_config(relay: SocketAddr, port: u16) -> SessionConfig {
    SessionConfig::new(relay.to_string(), PeerIdentity::new("127.0.0.1", port))
}

/// Sends one raw line and returns every line the relay sends back before
/// closing the connection.
async fn raw_exchange(relay: SocketAddr, line: &str) -> Vec<String> {
    let stream = TcpStream::connect(relay).await.unwrap();
    let (read, mut write) = stream.into_split();
    write
        .write_all(format!("{line}\n").as_bytes())
        .await
        .unwrap();

    let mut lines = BufReader::new(read).lines();
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line);
        }
    })
    .await
    .expect("relay should close the connection");
    received
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn two_peers_join_and_are_active() {
    let (relay, state) = start_relay().await;

    let (_tx1, _rx1) = spawn_session(session_config(relay, 9011)).await.unwrap();
    let (_tx2, _rx2) = spawn_session(session_config(relay, 9010)).await.unwrap();

    assert_eq!(
        state.registry.snapshot().await,
        vec![
            PeerIdentity::new("127.0.0.1", 9010),
            PeerIdentity::new("127.0.0.1", 9011),
        ]
    );
    // The accept line is queued just before activation, so a session may
    // still read as joining here.
    for port in [9010, 9011] {
        let identity = PeerIdentity::new("127.0.0.1", port);
        let state_now = state.registry.state_of(&identity).await;
        assert!(matches!(
            state_now,
            Some(SessionState::Active | SessionState::Joining)
        ));
    }
}

#[tokio::test]
async fn many_distinct_peers_all_join() {
    let (relay, state) = start_relay().await;

    let mut sessions = Vec::new();
    for port in 9100..9120 {
        sessions.push(spawn_session(session_config(relay, port)).await.unwrap());
    }
    assert_eq!(state.registry.len().await, 20);
}

#[tokio::test]
async fn duplicate_identity_is_rejected() {
    let (relay, state) = start_relay().await;

    let (_tx1, _rx1) = spawn_session(session_config(relay, 9000)).await.unwrap();
    let result = spawn_session(session_config(relay, 9000)).await;

    assert!(matches!(
        result,
        Err(ClientError::Rejected(RejectReason::DuplicateIdentity))
    ));
    assert_eq!(state.registry.len().await, 1);
}

#[tokio::test]
async fn username_does_not_change_identity() {
    let (relay, state) = start_relay().await;

    let (_tx, _rx) = spawn_session(session_config(relay, 9000).with_username("alice"))
        .await
        .unwrap();
    let result = spawn_session(session_config(relay, 9000).with_username("bob")).await;

    assert!(matches!(result, Err(ClientError::Rejected(_))));
    assert_eq!(
        state.registry.snapshot().await,
        vec![PeerIdentity::new("127.0.0.1", 9000)]
    );
}

#[tokio::test]
async fn malformed_first_lines_are_rejected() {
    let (relay, state) = start_relay().await;

    for line in [
        "request=join 127.0.0.1",
        "request=join 127.0.0.1 notaport",
        "request=join 127.0.0.1 0",
        "request=msg 127.0.0.1 9000 hi",
        "hello",
    ] {
        assert_eq!(
            raw_exchange(relay, line).await,
            vec!["response=reject reason=malformed-request".to_string()],
            "first line: {line}"
        );
    }
    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn raw_join_is_accepted() {
    let (relay, _state) = start_relay().await;

    let stream = TcpStream::connect(relay).await.unwrap();
    let (read, mut write) = stream.into_split();
    write
        .write_all(b"request=join 127.0.0.1 9005\n")
        .await
        .unwrap();
    let mut lines = BufReader::new(read).lines();
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some("response=accept")
    );
}
