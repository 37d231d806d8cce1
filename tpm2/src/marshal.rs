// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Marshalling/unmarshalling utilities
//!
//! TPM 2.0 structures are big-endian. Vendor payloads such as PinWeaver are
//! little-endian, so both byte orders are provided on the same buffers.

use thiserror::Error;

/// Error raised when a read runs past the end of a response buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer underflow reading {wanted} bytes (remaining: {remaining})")]
pub struct MarshalError {
    pub wanted: usize,
    pub remaining: usize,
}

pub type Result<T, E = MarshalError> = std::result::Result<T, E>;

/// Buffer for building commands
#[derive(Debug, Default)]
pub struct CommandBuffer {
    data: Vec<u8>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u16_le(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32_le(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64_le(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append `len` zero bytes
    pub fn put_zeros(&mut self, len: usize) {
        self.data.resize(self.data.len() + len, 0);
    }

    /// Put a TPM2B structure (2-byte size prefix + data)
    pub fn put_tpm2b(&mut self, data: &[u8]) {
        self.put_u16(data.len() as u16);
        self.put_bytes(data);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Update a big-endian u32 at a specific position (for size fields)
    pub fn update_u32(&mut self, pos: usize, v: u32) {
        self.data[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Update a little-endian u16 at a specific position
    pub fn update_u16_le(&mut self, pos: usize, v: u16) {
        self.data[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
    }
}

/// Buffer for parsing responses
#[derive(Debug)]
pub struct ResponseBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ResponseBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(MarshalError {
                wanted: len,
                remaining: self.remaining(),
            });
        }
        let v = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(v)
    }

    /// Read a fixed-size array
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.get_array().map(u16::from_be_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.get_array().map(u32::from_be_bytes)
    }

    pub fn get_u16_le(&mut self) -> Result<u16> {
        self.get_array().map(u16::from_le_bytes)
    }

    pub fn get_u32_le(&mut self) -> Result<u32> {
        self.get_array().map(u32::from_le_bytes)
    }

    pub fn get_u64_le(&mut self) -> Result<u64> {
        self.get_array().map(u64::from_le_bytes)
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.take(len).map(<[u8]>::to_vec)
    }

    /// Get a TPM2B structure (2-byte size prefix + data)
    pub fn get_tpm2b(&mut self) -> Result<Vec<u8>> {
        let size = self.get_u16()? as usize;
        self.get_bytes(size)
    }

    /// Get remaining bytes
    pub fn get_remaining(&mut self) -> Vec<u8> {
        let v = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        v
    }

    /// Skip bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }
}

/// Trait for types that can be marshalled to TPM format
pub trait Marshal {
    fn marshal(&self, buf: &mut CommandBuffer);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = CommandBuffer::new();
        self.marshal(&mut buf);
        buf.into_vec()
    }
}

/// Trait for types that can be unmarshalled from TPM format
pub trait Unmarshal: Sized {
    fn unmarshal(buf: &mut ResponseBuffer) -> anyhow::Result<Self>;

    fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        let mut buf = ResponseBuffer::new(data);
        Self::unmarshal(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_endianness() {
        let mut buf = CommandBuffer::new();
        buf.put_u16(0x0102);
        buf.put_u16_le(0x0102);
        buf.put_u32_le(0xdeadbeef);
        buf.put_u64_le(0x1b1);
        assert_eq!(
            hex::encode(buf.as_bytes()),
            "01020201efbeaddeb101000000000000"
        );

        let bytes = buf.into_vec();
        let mut rd = ResponseBuffer::new(&bytes);
        assert_eq!(rd.get_u16().unwrap(), 0x0102);
        assert_eq!(rd.get_u16_le().unwrap(), 0x0102);
        assert_eq!(rd.get_u32_le().unwrap(), 0xdeadbeef);
        assert_eq!(rd.get_u64_le().unwrap(), 0x1b1);
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn test_underflow_is_reported_without_advancing() {
        let data = [1u8, 2, 3];
        let mut rd = ResponseBuffer::new(&data);
        rd.skip(1).unwrap();
        let err = rd.get_u32().unwrap_err();
        assert_eq!(
            err,
            MarshalError {
                wanted: 4,
                remaining: 2
            }
        );
        assert_eq!(rd.position(), 1);
        assert_eq!(rd.get_u16_le().unwrap(), 0x0302);
    }

    #[test]
    fn test_tpm2b() {
        let mut buf = CommandBuffer::new();
        buf.put_tpm2b(b"abc");
        buf.put_tpm2b(&[]);
        let bytes = buf.into_vec();
        assert_eq!(bytes, [0, 3, b'a', b'b', b'c', 0, 0]);

        let mut rd = ResponseBuffer::new(&bytes);
        assert_eq!(rd.get_tpm2b().unwrap(), b"abc");
        assert!(rd.get_tpm2b().unwrap().is_empty());
    }
}
