// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Credential metadata (`unimported_leaf_data`) validation
//!
//! ```text
//! minor u16 | major u16 | pub_len u16 | sec_len u16 | hmac[32] | iv[16] | pub | sec
//! ```
//!
//! The firmware encrypts `sec` and authenticates everything after `hmac`.
//! We only check that the declared lengths add up before trusting any slice.

use hwsec_tpm2::ResponseBuffer;

use super::constants::*;
use super::error::{CodecError, Result};

/// Fixed header of a leaf record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafHeader {
    pub minor: u16,
    pub major: u16,
    pub pub_len: u16,
    pub sec_len: u16,
}

impl LeafHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PW_LEAF_HEADER_SIZE {
            return Err(CodecError::BadSize {
                expected: PW_LEAF_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = ResponseBuffer::new(bytes);
        Ok(Self {
            minor: buf.get_u16_le()?,
            major: buf.get_u16_le()?,
            pub_len: buf.get_u16_le()?,
            sec_len: buf.get_u16_le()?,
        })
    }

    /// Total record size implied by the header
    pub fn record_size(&self) -> usize {
        PW_LEAF_HEADER_SIZE + self.pub_len as usize + self.sec_len as usize
    }
}

/// An opaque leaf record and the HMAC the tree commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafData {
    pub cred_metadata: Vec<u8>,
    pub mac: [u8; PW_HASH_SIZE],
}

impl LeafData {
    /// Validate and split a leaf record
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = LeafHeader::parse(bytes)?;
        if bytes.len() != header.record_size() {
            return Err(CodecError::BadSize {
                expected: header.record_size(),
                actual: bytes.len(),
            });
        }
        let mut mac = [0u8; PW_HASH_SIZE];
        mac.copy_from_slice(&bytes[8..8 + PW_HASH_SIZE]);
        Ok(Self {
            cred_metadata: bytes.to_vec(),
            mac,
        })
    }

    pub fn header(&self) -> Result<LeafHeader> {
        LeafHeader::parse(&self.cred_metadata)
    }
}

/// Check that `cred_metadata` is a well-formed leaf record
pub fn validate_cred_metadata(cred_metadata: &[u8]) -> Result<()> {
    LeafData::parse(cred_metadata).map(|_| ())
}
