// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver error types

use hwsec_tpm2::MarshalError;
use thiserror::Error;

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Encoding or decoding failure
///
/// These never describe the firmware's verdict on a request; those come
/// back as a [`ResultCode`](crate::ResultCode).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("bad parameter: {0}")]
    BadParameter(&'static str),
    #[error("response is too short")]
    InsufficientBuffer,
    #[error("bad size: expected {expected} bytes, got {actual}")]
    BadSize { expected: usize, actual: usize },
    #[error("protocol version {version} is above the supported {max}")]
    AbiMismatch { version: u8, max: u8 },
    #[error("unknown log entry type {0}")]
    BadSequence(u8),
}

impl From<MarshalError> for CodecError {
    fn from(_: MarshalError) -> Self {
        CodecError::InsufficientBuffer
    }
}

/// Failure of a PinWeaver exchange with the TPM
#[derive(Debug, Error)]
pub enum PinWeaverError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("vendor command transport failed")]
    Transport(#[source] anyhow::Error),
    #[error("PinWeaver vendor command failed with TPM error 0x{code:08x}")]
    Tpm { code: u32 },
}
