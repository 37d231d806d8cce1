// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver protocol constants, message types and result codes

use std::fmt;

/// Highest protocol version this crate speaks
pub const PW_PROTOCOL_VERSION: u8 = 1;

pub const PW_SECRET_SIZE: usize = 32;
pub const PW_HASH_SIZE: usize = 32;
pub const PW_MAX_PATH_SIZE: usize = 1024;
pub const PW_SCHED_COUNT: usize = 16;
pub const PW_MAX_PCR_CRITERIA_COUNT: usize = 2;
pub const PW_WRAP_BLOCK_SIZE: usize = 16;

/// Delay schedule value that locks the leaf for good
pub const PW_BLOCK_ATTEMPTS: u32 = u32::MAX;

/// Request header: version (1) + type (1) + data length (2)
pub const PW_REQUEST_HEADER_SIZE: usize = 4;

/// Response header: version (1) + data length (2) + result code (4) + root (32)
pub const PW_RESPONSE_HEADER_SIZE: usize = 1 + 2 + 4 + PW_HASH_SIZE;

/// Fixed part of `unimported_leaf_data`: four u16 fields, HMAC and IV
pub const PW_LEAF_HEADER_SIZE: usize = 8 + PW_HASH_SIZE + PW_WRAP_BLOCK_SIZE;

/// One `pw_get_log_entry_t`: type (1) + label (8) + root (32) + union (32)
pub const PW_LOG_ENTRY_SIZE: usize = 1 + 8 + PW_HASH_SIZE + 32;

/// Root hash of the Merkle tree
pub type RootHash = [u8; PW_HASH_SIZE];

/// PinWeaver message types (`pw_message_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Also used as the ping / version probe
    Invalid = 0,
    ResetTree = 1,
    InsertLeaf = 2,
    RemoveLeaf = 3,
    TryAuth = 4,
    ResetAuth = 5,
    GetLog = 6,
    LogReplay = 7,
}

impl MessageType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MessageType::Invalid),
            1 => Some(MessageType::ResetTree),
            2 => Some(MessageType::InsertLeaf),
            3 => Some(MessageType::RemoveLeaf),
            4 => Some(MessageType::TryAuth),
            5 => Some(MessageType::ResetAuth),
            6 => Some(MessageType::GetLog),
            7 => Some(MessageType::LogReplay),
            _ => None,
        }
    }
}

/// Application-level result code returned by the firmware
///
/// These are data, not errors: a failed authentication is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

const PW_ERR_BASE: u32 = 0x10000;

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const UNKNOWN: Self = Self(1);
    pub const UNIMPLEMENTED: Self = Self(2);
    pub const VERSION_MISMATCH: Self = Self(PW_ERR_BASE);
    pub const TREE_INVALID: Self = Self(PW_ERR_BASE + 1);
    pub const LENGTH_INVALID: Self = Self(PW_ERR_BASE + 2);
    pub const TYPE_INVALID: Self = Self(PW_ERR_BASE + 3);
    pub const BITS_PER_LEVEL_INVALID: Self = Self(PW_ERR_BASE + 4);
    pub const HEIGHT_INVALID: Self = Self(PW_ERR_BASE + 5);
    pub const LABEL_INVALID: Self = Self(PW_ERR_BASE + 6);
    pub const DELAY_SCHEDULE_INVALID: Self = Self(PW_ERR_BASE + 7);
    pub const PATH_AUTH_FAILED: Self = Self(PW_ERR_BASE + 8);
    pub const LEAF_VERSION_MISMATCH: Self = Self(PW_ERR_BASE + 9);
    pub const HMAC_AUTH_FAILED: Self = Self(PW_ERR_BASE + 10);
    pub const LOWENT_AUTH_FAILED: Self = Self(PW_ERR_BASE + 11);
    pub const RESET_AUTH_FAILED: Self = Self(PW_ERR_BASE + 12);
    pub const CRYPTO_FAILURE: Self = Self(PW_ERR_BASE + 13);
    pub const RATE_LIMIT_REACHED: Self = Self(PW_ERR_BASE + 14);
    pub const ROOT_NOT_FOUND: Self = Self(PW_ERR_BASE + 15);
    pub const NV_EMPTY: Self = Self(PW_ERR_BASE + 16);
    pub const NV_LENGTH_MISMATCH: Self = Self(PW_ERR_BASE + 17);
    pub const NV_VERSION_MISMATCH: Self = Self(PW_ERR_BASE + 18);
    pub const PCR_NOT_MATCH: Self = Self(PW_ERR_BASE + 19);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SUCCESS => "EC_SUCCESS",
            Self::UNKNOWN => "EC_ERROR_UNKNOWN",
            Self::UNIMPLEMENTED => "EC_ERROR_UNIMPLEMENTED",
            Self::VERSION_MISMATCH => "PW_ERR_VERSION_MISMATCH",
            Self::TREE_INVALID => "PW_ERR_TREE_INVALID",
            Self::LENGTH_INVALID => "PW_ERR_LENGTH_INVALID",
            Self::TYPE_INVALID => "PW_ERR_TYPE_INVALID",
            Self::BITS_PER_LEVEL_INVALID => "PW_ERR_BITS_PER_LEVEL_INVALID",
            Self::HEIGHT_INVALID => "PW_ERR_HEIGHT_INVALID",
            Self::LABEL_INVALID => "PW_ERR_LABEL_INVALID",
            Self::DELAY_SCHEDULE_INVALID => "PW_ERR_DELAY_SCHEDULE_INVALID",
            Self::PATH_AUTH_FAILED => "PW_ERR_PATH_AUTH_FAILED",
            Self::LEAF_VERSION_MISMATCH => "PW_ERR_LEAF_VERSION_MISMATCH",
            Self::HMAC_AUTH_FAILED => "PW_ERR_HMAC_AUTH_FAILED",
            Self::LOWENT_AUTH_FAILED => "PW_ERR_LOWENT_AUTH_FAILED",
            Self::RESET_AUTH_FAILED => "PW_ERR_RESET_AUTH_FAILED",
            Self::CRYPTO_FAILURE => "PW_ERR_CRYPTO_FAILURE",
            Self::RATE_LIMIT_REACHED => "PW_ERR_RATE_LIMIT_REACHED",
            Self::ROOT_NOT_FOUND => "PW_ERR_ROOT_NOT_FOUND",
            Self::NV_EMPTY => "PW_ERR_NV_EMPTY",
            Self::NV_LENGTH_MISMATCH => "PW_ERR_NV_LENGTH_MISMATCH",
            Self::NV_VERSION_MISMATCH => "PW_ERR_NV_VERSION_MISMATCH",
            Self::PCR_NOT_MATCH => "PW_ERR_PCR_NOT_MATCH",
            _ => "?",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.0)
    }
}

impl From<u32> for ResultCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_values() {
        assert_eq!(ResultCode::TYPE_INVALID.0, 0x10003);
        assert_eq!(ResultCode::LOWENT_AUTH_FAILED.0, 0x1000b);
        assert_eq!(ResultCode::RATE_LIMIT_REACHED.0, 0x1000e);
        assert_eq!(ResultCode::PCR_NOT_MATCH.0, 0x10013);
    }

    #[test]
    fn test_result_code_display() {
        assert_eq!(
            ResultCode::LOWENT_AUTH_FAILED.to_string(),
            "PW_ERR_LOWENT_AUTH_FAILED (0x1000b)"
        );
        assert_eq!(ResultCode(0x20000).name(), "?");
        assert!(ResultCode::from(0).is_success());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(PW_RESPONSE_HEADER_SIZE, 39);
        assert_eq!(PW_LEAF_HEADER_SIZE, 56);
        assert_eq!(PW_LOG_ENTRY_SIZE, 73);
        assert_eq!(MessageType::from_u8(7), Some(MessageType::LogReplay));
        assert_eq!(MessageType::from_u8(8), None);
    }
}
