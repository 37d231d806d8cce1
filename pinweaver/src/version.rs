// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use super::constants::PW_PROTOCOL_VERSION;
use super::error::{CodecError, Result};

/// Negotiated PinWeaver protocol version
///
/// Version 0 lacks PCR criteria in InsertLeaf and the reset secret in the
/// TryAuth response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    pub const V0: Self = Self(0);
    pub const V1: Self = Self(1);
    pub const LATEST: Self = Self(PW_PROTOCOL_VERSION);

    pub fn new(version: u8) -> Result<Self> {
        if version > PW_PROTOCOL_VERSION {
            return Err(CodecError::AbiMismatch {
                version,
                max: PW_PROTOCOL_VERSION,
            });
        }
        Ok(Self(version))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn has_pcr_criteria(self) -> bool {
        self.0 >= 1
    }

    pub fn has_reset_secret(self) -> bool {
        self.0 >= 1
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        assert_eq!(ProtocolVersion::new(0).unwrap(), ProtocolVersion::V0);
        assert_eq!(ProtocolVersion::new(1).unwrap(), ProtocolVersion::LATEST);
        assert_eq!(
            ProtocolVersion::new(2),
            Err(CodecError::AbiMismatch { version: 2, max: 1 })
        );
        assert!(!ProtocolVersion::V0.has_reset_secret());
        assert!(ProtocolVersion::V1.has_pcr_criteria());
    }
}
