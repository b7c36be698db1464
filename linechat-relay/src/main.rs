//! `linechat` relay server.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:9002
//! cargo run --bin linechat-relay
//!
//! # Run on custom address
//! cargo run --bin linechat-relay -- --bind 0.0.0.0:9002
//!
//! # Or via environment variable
//! LINECHAT_RELAY_ADDR=0.0.0.0:9002 cargo run --bin linechat-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use linechat_relay::config::{RelayCliArgs, RelayConfig};
use linechat_relay::server;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Audit lines go to stderr alongside everything else.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(addr = %config.bind_addr, "starting linechat relay");

    let state = Arc::new(config.relay_state());

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay accept loop failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay");
            std::process::exit(1);
        }
    }
}
