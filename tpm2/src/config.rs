// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Session configuration

use serde::{Deserialize, Serialize};

use super::constants::*;
use super::error::{Result, SessionError};

const MAX_NONCE_SIZE: usize = 64;

/// Parameters for salted HMAC session establishment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persistent handle of the RSA key that salts new sessions
    pub salting_key_handle: u32,
    /// Size of the caller nonce sent with `TPM2_StartAuthSession`
    pub nonce_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            salting_key_handle: persistent::SALTING_KEY,
            nonce_size: SALT_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_NONCE_SIZE..=MAX_NONCE_SIZE).contains(&self.nonce_size) {
            return Err(SessionError::InvalidConfig(format!(
                "nonce_size must be between {} and {} bytes, got {}",
                MIN_NONCE_SIZE, MAX_NONCE_SIZE, self.nonce_size
            )));
        }
        if self.salting_key_handle >> 24 != 0x81 {
            return Err(SessionError::InvalidConfig(format!(
                "salting key 0x{:08x} is not a persistent handle",
                self.salting_key_handle
            )));
        }
        Ok(())
    }
}
