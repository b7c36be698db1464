//! TCP accept loop and per-peer session loop.
//!
//! Each accepted connection gets its own task. The task runs the join
//! handshake, then splits into a writer (draining the session's outbox to
//! the socket) and a reader (parsing requests and feeding the relay). When
//! either side finishes, the session is closed through the disconnect path.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use linechat_proto::codec::{self, LinesCodecError};
use linechat_proto::identity::PeerIdentity;
use linechat_proto::relay::{Request, ServerLine};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::audit;
use crate::disconnect::{self, DisconnectCause};
use crate::handshake;
use crate::registry::{Outbox, SessionHandle};
use crate::relay::{RelayState, SubmitError};

/// Handles one accepted TCP connection for its whole lifetime.
///
/// The connection lifecycle:
/// 1. Read the first line and run the join handshake.
/// 2. On reject, reply `response=reject` and close.
/// 3. Spawn the writer and reader halves.
/// 4. On quit, end-of-stream, or I/O failure, disconnect the session.
pub async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) {
    let remote = stream.peer_addr().ok();
    let framed = Framed::new(stream, codec::line_codec(state.max_line_length()));
    let (mut sink, mut lines) = framed.split();

    let first_line = match lines.next().await {
        Some(Ok(line)) => line,
        Some(Err(e)) => {
            tracing::warn!(remote = ?remote, error = %e, "connection failed before join");
            return;
        }
        None => {
            tracing::debug!(remote = ?remote, "connection closed before join");
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerLine>();

    let handle = match handshake::join(&state, &first_line, tx.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            if let Some(reason) = e.reason() {
                let reject = ServerLine::Reject { reason };
                if let Err(err) = sink.send(reject.to_string()).await {
                    tracing::debug!(remote = ?remote, error = %err, "failed to send reject");
                }
            }
            // Dropping both halves closes the connection.
            return;
        }
    };

    let writer_peer = handle.identity.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = sink.send(line.to_string()).await {
                tracing::warn!(peer = %writer_peer, error = %e, "write to peer failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let reader_handle = handle.clone();
    let mut read_task = tokio::spawn(async move {
        loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    if let Some(cause) = on_line(&reader_state, &reader_handle, &tx, &line).await
                    {
                        return cause;
                    }
                }
                Some(Err(e)) => {
                    log_read_error(&reader_handle.identity, &e);
                    return DisconnectCause::ConnectionLost;
                }
                None => return DisconnectCause::ConnectionLost,
            }
        }
    });

    let cause = tokio::select! {
        res = &mut read_task => res.unwrap_or(DisconnectCause::ConnectionLost),
        _ = &mut write_task => {
            read_task.abort();
            DisconnectCause::ConnectionLost
        }
    };

    disconnect::disconnect(&state, &handle, cause).await;

    match cause {
        // The registry and reader no longer hold the outbox, so the writer
        // flushes what is queued and then ends, unless the peer stopped
        // reading.
        DisconnectCause::Explicit => {
            let flush = tokio::time::timeout(state.quit_flush_timeout(), &mut write_task).await;
            if flush.is_err() {
                tracing::debug!(
                    peer = %handle.identity,
                    timeout = ?state.quit_flush_timeout(),
                    "peer quit without draining its queue, dropping unsent lines"
                );
                write_task.abort();
            }
        }
        DisconnectCause::ConnectionLost => write_task.abort(),
    }
}

/// Processes one line from an active session. Returns `Some` when the
/// session should end.
async fn on_line(
    state: &RelayState,
    handle: &SessionHandle,
    outbox: &Outbox,
    line: &str,
) -> Option<DisconnectCause> {
    match line.parse::<Request>() {
        Ok(Request::Quit) => {
            tracing::info!(peer = %handle.identity, "peer sent quit");
            Some(DisconnectCause::Explicit)
        }
        Ok(Request::Msg { identity, text }) => {
            relay_message(state, handle, outbox, &identity, text).await;
            None
        }
        Ok(Request::Join { identity, .. }) => {
            tracing::warn!(
                peer = %handle.identity,
                requested = %identity,
                "ignoring join from an already joined session"
            );
            None
        }
        Err(e) => {
            tracing::warn!(peer = %handle.identity, error = %e, "ignoring malformed request");
            None
        }
    }
}

/// Submits a message and acknowledges it to the sender.
async fn relay_message(
    state: &RelayState,
    handle: &SessionHandle,
    outbox: &Outbox,
    claimed: &PeerIdentity,
    text: String,
) {
    // The registered identity is authoritative; the line's copy is not.
    if claimed != &handle.identity {
        tracing::warn!(
            peer = %handle.identity,
            claimed = %claimed,
            "message identity does not match session, using session identity"
        );
    }

    match state.submit(handle, text).await {
        Ok(ack) => {
            audit::msg_accepted(&handle.identity, ack.sequence);
            let _ = outbox.send(ServerLine::Accept);
            let _ = outbox.send(ServerLine::Accepted {
                sequence: ack.sequence,
            });
        }
        Err(SubmitError::NotActive(peer)) => {
            tracing::debug!(peer = %peer, "dropping message from inactive session");
        }
    }
}

fn log_read_error(peer: &PeerIdentity, err: &LinesCodecError) {
    if codec::is_transport_error(err) {
        tracing::info!(peer = %peer, error = %err, "connection lost");
    } else {
        tracing::warn!(peer = %peer, error = %err, "peer sent an oversized line");
    }
}

/// Starts the relay on the given address and returns the bound address and
/// a join handle for the accept loop.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(accept_loop(listener, state));

    Ok((bound_addr, handle))
}

async fn accept_loop(listener: TcpListener, state: Arc<RelayState>) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                tracing::debug!(remote = %remote, "accepted connection");
                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
            }
            Err(e) => {
                // Usually fd exhaustion; the listener itself stays usable.
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}
