//! Threshold compression
//!
//! Once enabled every frame body is `varint data_length ++ payload`. A
//! `data_length` of zero marks an uncompressed payload; anything else is the
//! size of the zlib-inflated payload.

use std::io::{Read, Write};

use bytes::BytesMut;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::Stage;
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

/// Upper bound on an inflated body
pub const MAX_DECOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Compression stage
#[derive(Debug)]
pub struct CompressionStage {
    threshold: usize,
}

impl CompressionStage {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Stage for CompressionStage {
    fn decode(&mut self, input: BytesMut, out: &mut Vec<BytesMut>) -> Result<(), CodecError> {
        let mut buffer = PacketBuffer::wrap(input);
        let data_length = buffer.read_varint()?;

        if data_length == 0 {
            out.push(BytesMut::from(&buffer.read_remaining()[..]));
            return Ok(());
        }

        let data_length = usize::try_from(data_length).map_err(|_| {
            CodecError::Compression(format!("negative data length {}", data_length))
        })?;
        if data_length < self.threshold {
            return Err(CodecError::Compression(format!(
                "data length {} is below the threshold of {}",
                data_length, self.threshold
            )));
        }
        if data_length > MAX_DECOMPRESSED_SIZE {
            return Err(CodecError::Compression(format!(
                "data length {} exceeds the maximum of {}",
                data_length, MAX_DECOMPRESSED_SIZE
            )));
        }

        let compressed = buffer.read_remaining();
        let mut inflated = Vec::with_capacity(data_length);
        // Read one byte past the claim so an oversized payload is noticed
        ZlibDecoder::new(&compressed[..])
            .take(data_length as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| CodecError::Compression(format!("inflate failed: {}", e)))?;

        if inflated.len() != data_length {
            return Err(CodecError::Compression(format!(
                "inflated {} bytes, expected {}",
                inflated.len(),
                data_length
            )));
        }

        out.push(BytesMut::from(&inflated[..]));
        Ok(())
    }

    fn encode(&mut self, input: BytesMut) -> Result<BytesMut, CodecError> {
        let mut buffer = PacketBuffer::with_capacity(input.len() + 5);

        if input.len() < self.threshold {
            buffer.write_varint(0);
            buffer.write_bytes(&input);
            return Ok(buffer.into_inner());
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&input)
            .map_err(|e| CodecError::Compression(format!("deflate failed: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| CodecError::Compression(format!("deflate failed: {}", e)))?;

        buffer.write_varint(input.len() as i32);
        buffer.write_bytes(&compressed);
        Ok(buffer.into_inner())
    }
}
