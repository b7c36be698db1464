//! `linechat` relay server library.
//!
//! Exposes the relay for use in tests and embedding. The relay accepts TCP
//! connections, admits peers by their self-reported `(host, port)` identity,
//! replays the message history to each newcomer, and fans every accepted
//! message out to the other connected peers.

pub mod audit;
pub mod config;
pub mod disconnect;
pub mod handshake;
pub mod history;
pub mod registry;
pub mod relay;
pub mod server;

#[cfg(test)]
mod test_support;
