//! Line framing for both pipes the host speaks over.
//!
//! The engine's stdin/stdout and the client channel each carry one JSON
//! object per `\n`-terminated line. [`LineCodec`] only splits and joins
//! lines; turning them into engine replies or client events happens in
//! [`crate::protocol::message`] and [`crate::client`].

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::{AppError, Result};

/// Longest line the host will buffer: 16 MiB.
///
/// A `settings` reply embeds the whole world description, which for large
/// worlds runs to several megabytes on one line.
pub const MAX_LINE_BYTES: usize = 16 * 1_048_576;

/// Splits engine stdout and client input into lines, and terminates engine
/// requests and client frames with `\n`.
///
/// A partial line stays buffered until the rest of it arrives. A line over
/// [`MAX_LINE_BYTES`] yields [`AppError::Protocol`] once; the codec then
/// drops bytes up to the next newline and carries on, so one oversized
/// reply never ends a session.
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
}

impl LineCodec {
    /// Codec limited to [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        Ok(self.lines.decode(src)?)
    }

    /// An engine that dies mid-line still has its last fragment delivered.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        Ok(self.lines.decode_eof(src)?)
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        Ok(self.lines.encode(line, dst)?)
    }
}
