//! `linechat` client library.
//!
//! [`session`] speaks the relay protocol, [`config`] resolves settings, and
//! [`render`] formats what arrives for display.

pub mod config;
pub mod render;
pub mod session;
