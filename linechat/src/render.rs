//! Turns session events into the lines a user sees.

use chrono::NaiveTime;

use crate::config::Mode;
use crate::session::ClientEvent;

/// Renders one event, stamping replayed history with `at`.
///
/// History comes out as `HH:MM:SS <who>: <text>` and live traffic as
/// `msg <who>: <text>`.
#[must_use]
pub fn render(event: &ClientEvent, at: NaiveTime) -> String {
    match event {
        ClientEvent::History { from, text } => {
            format!("{} {from}: {text}", at.format("%H:%M:%S"))
        }
        ClientEvent::Message { from, text } => format!("msg {from}: {text}"),
        ClientEvent::Accepted { sequence } => format!("response=accepted seq={sequence}"),
        ClientEvent::Closed { reason: None } => "connection closed".to_string(),
        ClientEvent::Closed {
            reason: Some(reason),
        } => format!("connection closed: {reason}"),
    }
}

/// Short tag for the event, attached to log records as `kind`.
#[must_use]
pub const fn kind(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::History { .. } => "history",
        ClientEvent::Message { .. } => "msg",
        ClientEvent::Accepted { .. } => "accepted",
        ClientEvent::Closed { .. } => "closed",
    }
}

/// Writes a rendered event to the log or to stdout depending on `mode`.
pub fn emit(event: &ClientEvent, mode: Mode) {
    let line = render(event, chrono::Local::now().time());
    let kind = kind(event);

    match (event, mode) {
        (ClientEvent::Closed { .. }, _) => tracing::warn!(kind, "{line}"),
        (ClientEvent::Accepted { .. }, _) | (_, Mode::Detailed) => {
            tracing::info!(kind, "{line}");
        }
        (_, Mode::Quiet) => println!("{line}"),
    }
}
