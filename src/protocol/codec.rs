//! Relay wire codec: one JSON-encoded [`DvrPacket`] per `\n`-terminated line.
//!
//! A line that does not parse is handed up as a per-frame [`DecodeError`]
//! instead of failing the stream, so a long-running router can drop it and
//! keep reading. Only oversized lines and I/O failures end the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::messages::DvrPacket;
use crate::error::{DecodeError, TransportError};

/// Maximum frame length, newline excluded.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct DvrCodec {
    // Bytes already scanned for a newline.
    scanned: usize,
}

impl DvrCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for DvrCodec {
    type Item = Result<DvrPacket, DecodeError>;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.scanned..].iter().position(|&b| b == b'\n');

        match newline {
            Some(offset) => {
                let line = src.split_to(self.scanned + offset);
                src.advance(1);
                self.scanned = 0;

                if line.len() > MAX_FRAME_LENGTH {
                    return Err(TransportError::FrameTooLong(MAX_FRAME_LENGTH));
                }
                Ok(Some(parse_line(&line)))
            }
            None => {
                if src.len() > MAX_FRAME_LENGTH {
                    return Err(TransportError::FrameTooLong(MAX_FRAME_LENGTH));
                }
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                // Trailing line without a newline.
                let line = src.split_to(src.len());
                self.scanned = 0;
                Ok(Some(parse_line(&line)))
            }
        }
    }
}

impl Encoder<DvrPacket> for DvrCodec {
    type Error = TransportError;

    fn encode(&mut self, item: DvrPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = item.serialize()?;
        dst.reserve(wire.len() + 1);
        dst.put_slice(&wire);
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn parse_line(line: &[u8]) -> Result<DvrPacket, DecodeError> {
    let text = std::str::from_utf8(line)?;
    let text = text.trim_end_matches('\r');
    Ok(DvrPacket::deserialize(text.as_bytes())?)
}
