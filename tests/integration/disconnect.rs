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

//! Integration tests for leaving the relay.
//!
//! These tests validate:
//! - `\q` closes the session and frees the identity for a later join
//! - Dropping every command sender behaves like `\q`
//! - An abrupt TCP close is detected and the peer deregistered
//! - Remaining peers keep exchanging messages after someone leaves
//! - Each closure is audited exactly once
//!
//! Verification command: `cargo test --test disconnect`

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use linechat::session::{ClientCommand, ClientEvent, SessionConfig, spawn_session};
use linechat_proto::identity::PeerIdentity;
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

async fn join(
    relay: SocketAddr,
    port: u16,
) -> (mpsc::Sender<ClientCommand>, mpsc::Receiver<ClientEvent>) {
    spawn_session(SessionConfig::new(
        relay.to_string(),
        PeerIdentity::new("127.0.0.1", port),
    ))
    .await
    .expect("join should succeed")
}

async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("session ended unexpectedly")
}

/// Waits until the relay no longer holds a session for `port`.
async fn wait_until_gone(state: &RelayState, port: u16) {
    let identity = PeerIdentity::new("127.0.0.1", port);
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.registry.state_of(&identity).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was never closed");
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CaptureWriter {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn quit_closes_session_and_frees_identity() {
    let (relay, state) = start_relay().await;
    let (tx1, mut rx1) = join(relay, 9000).await;

    tx1.send(ClientCommand::Quit).await.unwrap();
    assert_eq!(
        next_event(&mut rx1).await,
        ClientEvent::Closed { reason: None }
    );
    wait_until_gone(&state, 9000).await;

    // Same identity may join again once the old session is gone.
    let (_tx, _rx) = join(relay, 9000).await;
    assert_eq!(state.registry.len().await, 1);
}

#[tokio::test]
async fn dropping_command_sender_quits() {
    let (relay, state) = start_relay().await;
    let (tx1, mut rx1) = join(relay, 9000).await;

    drop(tx1);
    assert_eq!(
        next_event(&mut rx1).await,
        ClientEvent::Closed { reason: None }
    );
    wait_until_gone(&state, 9000).await;
}

#[tokio::test]
async fn abrupt_close_is_detected() {
    let (relay, state) = start_relay().await;

    let stream = TcpStream::connect(relay).await.unwrap();
    let (read, mut write) = stream.into_split();
    write
        .write_all(b"request=join 127.0.0.1 9000\n")
        .await
        .unwrap();
    let mut lines = BufReader::new(read).lines();
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some("response=accept")
    );

    drop(lines);
    drop(write);
    wait_until_gone(&state, 9000).await;
}

#[tokio::test]
async fn remaining_peers_keep_talking() {
    let (relay, state) = start_relay().await;
    let (tx1, mut rx1) = join(relay, 9000).await;
    let (tx2, mut rx2) = join(relay, 9001).await;
    let (_tx3, mut rx3) = join(relay, 9002).await;

    tx2.send(ClientCommand::Quit).await.unwrap();
    assert_eq!(
        next_event(&mut rx2).await,
        ClientEvent::Closed { reason: None }
    );
    wait_until_gone(&state, 9001).await;

    tx1.send(ClientCommand::Send("anyone left?".into()))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut rx1).await,
        ClientEvent::Accepted { sequence: 1 }
    );
    assert_eq!(
        next_event(&mut rx3).await,
        ClientEvent::Message {
            from: "[127.0.0.1:9000]".into(),
            text: "anyone left?".into(),
        }
    );
}

#[tokio::test]
async fn each_closure_is_audited_once() {
    let writer = CaptureWriter::default();
    let capture = writer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || capture.clone())
        .with_ansi(false)
        .finish();
    // The test runtime is single-threaded, so every task logs through this.
    let _guard = tracing::subscriber::set_default(subscriber);

    let (relay, state) = start_relay().await;
    let (tx1, mut rx1) = join(relay, 9000).await;
    let (_tx2, _rx2) = join(relay, 9001).await;

    tx1.send(ClientCommand::Quit).await.unwrap();
    assert_eq!(
        next_event(&mut rx1).await,
        ClientEvent::Closed { reason: None }
    );
    wait_until_gone(&state, 9000).await;
    // Let the connection teardown finish logging.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let logs = writer.contents();
    assert_eq!(logs.matches("close 127.0.0.1:9000").count(), 1, "{logs}");
    assert!(logs.contains("close 127.0.0.1:9000 cause=explicit"), "{logs}");
    assert!(!logs.contains("close 127.0.0.1:9001"), "{logs}");
    assert_eq!(
        logs.matches("request=join 127.0.0.1 9000 response=accept")
            .count(),
        2,
        "relay and client each record the join: {logs}"
    );
}
