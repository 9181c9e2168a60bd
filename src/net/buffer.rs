//! Packet buffer implementation
//!
//! Provides a byte buffer with the protocol's primitive read/write operations:
//! - Big-endian fixed width integers and IEEE-754 floats
//! - Single-byte booleans
//! - VarInt / VarLong (LEB128 over two's complement)
//! - Length-prefixed UTF-8 strings and byte arrays
//! - UUIDs as two big-endian longs
//!
//! Every read is bounds checked and fails with a [`CodecError`] instead of
//! reading past the end of the buffer.

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use crate::error::CodecError;

/// Maximum number of bytes in an encoded VarInt
pub const MAX_VARINT_LEN: usize = 5;

/// Maximum number of bytes in an encoded VarLong
pub const MAX_VARLONG_LEN: usize = 10;

/// Packet buffer for reading and writing protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    /// Create a packet buffer by wrapping a BytesMut
    pub fn wrap(data: BytesMut) -> Self {
        Self { data, read_pos: 0 }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the underlying BytesMut
    #[inline]
    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    /// Fail unless `count` more bytes can be read
    #[inline]
    fn ensure(&self, count: usize) -> Result<(), CodecError> {
        if self.remaining() < count {
            return Err(CodecError::InsufficientData {
                expected: count,
                actual: self.remaining(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Ok(out)
    }

    // ============ Reading Methods ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a boolean (exactly 0 or 1)
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidValue {
                field: "bool",
                value: other.to_string(),
            }),
        }
    }

    /// Read an unsigned big-endian short
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    /// Read a signed big-endian short
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    /// Read a signed big-endian int
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    /// Read a signed big-endian long
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    /// Read a big-endian 32-bit float
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_be_bytes(self.take()?))
    }

    /// Read a big-endian 64-bit float
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_be_bytes(self.take()?))
    }

    /// Read a VarInt (at most 5 bytes)
    pub fn read_varint(&mut self) -> Result<i32, CodecError> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(CodecError::VarIntTooLong)
    }

    /// Read a VarLong (at most 10 bytes)
    pub fn read_varlong(&mut self) -> Result<i64, CodecError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARLONG_LEN {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(CodecError::VarIntTooLong)
    }

    /// Read a VarInt that must not be negative, for use as a length
    fn read_length(&mut self, field: &'static str) -> Result<usize, CodecError> {
        let length = self.read_varint()?;
        usize::try_from(length).map_err(|_| CodecError::InvalidValue {
            field,
            value: length.to_string(),
        })
    }

    /// Read a length-prefixed UTF-8 string of at most `max_chars` characters
    pub fn read_string(&mut self, max_chars: usize) -> Result<String, CodecError> {
        let length = self.read_length("string length")?;
        // A character is at most 4 bytes in UTF-8
        if length > max_chars * 4 {
            return Err(CodecError::StringTooLong {
                max: max_chars,
                actual: length,
            });
        }
        let bytes = self.read_bytes(length)?;
        let value = String::from_utf8(bytes).map_err(|_| CodecError::InvalidStringEncoding)?;
        let chars = value.chars().count();
        if chars > max_chars {
            return Err(CodecError::StringTooLong {
                max: max_chars,
                actual: chars,
            });
        }
        Ok(value)
    }

    /// Read a length-prefixed byte array
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>, CodecError> {
        let length = self.read_length("array length")?;
        self.read_bytes(length)
    }

    /// Read a UUID (two big-endian longs)
    pub fn read_uuid(&mut self) -> Result<Uuid, CodecError> {
        Ok(Uuid::from_bytes(self.take()?))
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, CodecError> {
        self.ensure(length)?;
        let bytes = self.data[self.read_pos..self.read_pos + length].to_vec();
        self.read_pos += length;
        Ok(bytes)
    }

    /// Read everything that is left
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let bytes = self.data[self.read_pos..].to_vec();
        self.read_pos = self.data.len();
        bytes
    }

    // ============ Writing Methods ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write a signed byte
    pub fn write_i8(&mut self, value: i8) {
        self.data.put_i8(value);
    }

    /// Write a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.data.put_u8(value as u8);
    }

    /// Write an unsigned big-endian short
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    /// Write a signed big-endian short
    pub fn write_i16(&mut self, value: i16) {
        self.data.put_i16(value);
    }

    /// Write a signed big-endian int
    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write a signed big-endian long
    pub fn write_i64(&mut self, value: i64) {
        self.data.put_i64(value);
    }

    /// Write a big-endian 32-bit float
    pub fn write_f32(&mut self, value: f32) {
        self.data.put_f32(value);
    }

    /// Write a big-endian 64-bit float
    pub fn write_f64(&mut self, value: f64) {
        self.data.put_f64(value);
    }

    /// Write a VarInt
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            if value & !0x7f == 0 {
                self.data.put_u8(value as u8);
                return;
            }
            self.data.put_u8(((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
    }

    /// Write a VarLong
    pub fn write_varlong(&mut self, value: i64) {
        let mut value = value as u64;
        loop {
            if value & !0x7f == 0 {
                self.data.put_u8(value as u8);
                return;
            }
            self.data.put_u8(((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) {
        self.write_varint(value.len() as i32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a length-prefixed byte array
    pub fn write_byte_array(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as i32);
        self.data.extend_from_slice(bytes);
    }

    /// Write a UUID as two big-endian longs
    pub fn write_uuid(&mut self, value: &Uuid) {
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

/// Number of bytes `value` occupies when written as a VarInt
pub fn varint_size(value: i32) -> usize {
    let value = value as u32;
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
