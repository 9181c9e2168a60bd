//! Length-prefix framing
//!
//! Splits the inbound byte stream into frames of `varint length ++ body` and
//! prefixes outbound bodies with their length. Partial frames stay buffered
//! until the rest arrives.

use bytes::{Buf, BufMut, BytesMut};

use super::Stage;
use crate::error::CodecError;
use crate::net::buffer::varint_size;

/// Maximum number of bytes in a length prefix
pub const MAX_LENGTH_PREFIX: usize = 3;

/// Largest body a 3 byte prefix can describe
pub const MAX_FRAME_SIZE: usize = (1 << 21) - 1;

/// Framing stage
#[derive(Debug, Default)]
pub struct FramingStage {
    /// Bytes of a frame that is not complete yet
    buffer: BytesMut,
}

impl FramingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes belonging to an incomplete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Peek the length prefix. `Ok(None)` means more bytes are needed.
    fn peek_length(&self) -> Result<Option<(usize, usize)>, CodecError> {
        let mut value: usize = 0;
        for (i, byte) in self.buffer.iter().take(MAX_LENGTH_PREFIX).enumerate() {
            value |= ((byte & 0x7f) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(Some((i + 1, value)));
            }
        }
        if self.buffer.len() >= MAX_LENGTH_PREFIX {
            return Err(CodecError::VarIntTooLong);
        }
        Ok(None)
    }
}

impl Stage for FramingStage {
    fn decode(&mut self, input: BytesMut, out: &mut Vec<BytesMut>) -> Result<(), CodecError> {
        if self.buffer.is_empty() {
            self.buffer = input;
        } else {
            self.buffer.unsplit(input);
        }

        while let Some((prefix, length)) = self.peek_length()? {
            if length == 0 {
                return Err(CodecError::EmptyFrame);
            }
            if self.buffer.len() < prefix + length {
                break;
            }
            self.buffer.advance(prefix);
            out.push(self.buffer.split_to(length));
        }
        Ok(())
    }

    fn encode(&mut self, input: BytesMut) -> Result<BytesMut, CodecError> {
        if input.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: input.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let length = input.len() as i32;
        let mut framed = BytesMut::with_capacity(varint_size(length) + input.len());
        let mut value = length as u32;
        while value >= 0x80 {
            framed.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        framed.put_u8(value as u8);
        framed.extend_from_slice(&input);
        Ok(framed)
    }
}
