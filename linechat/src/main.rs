//! `linechat` client.
//!
//! Joins a relay, prints what arrives, and sends each line typed on stdin
//! as a message. `\q` on its own line leaves the relay.
//!
//! ```bash
//! # Detailed mode: everything goes to the log
//! cargo run --bin linechat -- 9000 d 127.0.0.1 9002
//!
//! # Quiet mode with a username, logging to a file
//! cargo run --bin linechat -- 9001 q 127.0.0.1 9002 --username bob \
//!     --log-file /tmp/linechat-9001.log
//! ```

use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use linechat::config::{CliArgs, ClientConfig};
use linechat::render;
use linechat::session::{self, ClientCommand, ClientEvent};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(config.mode.log_level(), config.log_file.as_deref());

    tracing::info!(
        identity = %config.identity(),
        relay = %config.relay_addr(),
        mode = ?config.mode,
        "linechat starting"
    );

    let (cmd_tx, mut evt_rx) = match session::spawn_session(config.session_config()).await {
        Ok(channels) => channels,
        Err(e) => {
            tracing::error!(error = %e, "could not join relay");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    spawn_input_reader(cmd_tx);

    while let Some(event) = evt_rx.recv().await {
        render::emit(&event, config.mode);
        if matches!(event, ClientEvent::Closed { .. }) {
            break;
        }
    }

    tracing::info!("linechat exiting");
    ExitCode::SUCCESS
}

/// Initialize logging.
///
/// With a file path, logs go through a non-blocking file writer and the
/// returned [`WorkerGuard`] must be held until shutdown so buffered records
/// are flushed. Without one, logs go to stderr.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| {
        let dir = p.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        Some((dir, p.file_name()?.to_str()?))
    }) else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Reads stdin on a dedicated thread and forwards commands.
///
/// Blocking reads live outside the runtime so a terminal waiting for input
/// never holds up shutdown. End of input drops the sender, which the session
/// treats as a quit.
fn spawn_input_reader(cmd_tx: mpsc::Sender<ClientCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(cmd) = ClientCommand::from_input(&line) else {
                continue;
            };
            let quit = cmd == ClientCommand::Quit;
            if cmd_tx.blocking_send(cmd).is_err() || quit {
                break;
            }
        }
    });
}
