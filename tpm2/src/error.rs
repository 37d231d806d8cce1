// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Session establishment errors

use thiserror::Error;

use super::constants::TpmCc;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Failure establishing a salted authorization session
///
/// Whatever the variant, no session handle survives the failed attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to obtain the salting key")]
    SaltingKey(#[source] anyhow::Error),
    #[error("failed to encrypt the session salt")]
    Encryption(#[source] anyhow::Error),
    #[error("failed to generate random bytes")]
    Random(#[source] anyhow::Error),
    #[error("transport failure during {}", .command.name())]
    Transport {
        command: TpmCc,
        #[source]
        source: anyhow::Error,
    },
    #[error("{} returned TPM error 0x{code:08x}", .command.name())]
    Tpm { command: TpmCc, code: u32 },
    #[error("malformed {} response", .command.name())]
    Malformed {
        command: TpmCc,
        #[source]
        source: anyhow::Error,
    },
    #[error("session key derivation failed")]
    Derivation(#[source] anyhow::Error),
}
