//! Line framing for relay connections.
//!
//! Both directions of a relay connection are newline-delimited UTF-8. The
//! framing itself is `tokio-util`'s [`LinesCodec`]; this module pins the
//! maximum line length so a peer cannot grow the read buffer without bound.

use tokio_util::codec::LinesCodec;

pub use tokio_util::codec::LinesCodecError;

/// Default maximum line length in bytes (excluding the terminator).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Builds the line codec used on both ends of a relay connection.
///
/// Lines longer than `max_line_length` fail with
/// [`LinesCodecError::MaxLineLengthExceeded`]; a trailing `\r` is stripped.
#[must_use]
pub fn line_codec(max_line_length: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_line_length)
}

/// Returns `true` if a codec error means the transport itself failed, as
/// opposed to the peer sending an oversized line.
#[must_use]
pub const fn is_transport_error(err: &LinesCodecError) -> bool {
    matches!(err, LinesCodecError::Io(_))
}
