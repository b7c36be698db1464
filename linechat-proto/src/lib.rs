//! Shared protocol definitions for the `linechat` line-oriented wire format.

pub mod codec;
pub mod identity;
pub mod relay;
