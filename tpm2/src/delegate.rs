// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! HMAC session key derivation
//!
//! Implements the session key schedule from TPM 2.0 Library Part 1:
//!
//! ```text
//! sessionKey = KDFa(authHash, bind.authValue || salt, "ATH", nonceTPM, nonceCaller, digestBits)
//! ```

use anyhow::{bail, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::constants::*;

type HmacSha256 = Hmac<Sha256>;

const SESSION_KEY_LABEL: &str = "ATH";
const MIN_TPM_NONCE_SIZE: usize = 16;
const MAX_TPM_NONCE_SIZE: usize = 64;

/// Everything produced by `TPM2_StartAuthSession` that keys a new session
pub struct SessionSeed<'a> {
    pub handle: u32,
    pub nonce_tpm: &'a [u8],
    pub nonce_caller: &'a [u8],
    pub salt: &'a [u8],
    pub bind_auth: &'a [u8],
    pub enable_encryption: bool,
}

/// Accepts the material of a freshly started session
///
/// Returning an error aborts session establishment; the handle is flushed
/// and never reported as active.
pub trait AuthorizationDelegate {
    fn init_session(&mut self, seed: &SessionSeed<'_>) -> Result<()>;
}

/// KDFa (SP800-108 counter mode, HMAC-SHA256)
///
/// Each block is `HMAC(key, i || label || 0x00 || context_u || context_v || bits)`
/// with `i` and `bits` as big-endian u32.
pub fn kdfa(
    key: &[u8],
    label: &str,
    context_u: &[u8],
    context_v: &[u8],
    bits: u32,
) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = (bits as usize).div_ceil(8);
    let mut out = Zeroizing::new(Vec::with_capacity(bytes));
    let mut counter: u32 = 0;
    while out.len() < bytes {
        counter += 1;
        let mut mac = HmacSha256::new_from_slice(key)?;
        mac.update(&counter.to_be_bytes());
        mac.update(label.as_bytes());
        mac.update(&[0]);
        mac.update(context_u);
        mac.update(context_v);
        mac.update(&bits.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
    }
    out.truncate(bytes);

    // Partial trailing bytes keep only the low-order bits
    if bits % 8 != 0 {
        out[0] &= (1u8 << (bits % 8)) - 1;
    }
    Ok(out)
}

/// Delegate that keeps the SHA-256 HMAC session state of one session
#[derive(Default)]
pub struct HmacAuthorizationDelegate {
    handle: Option<u32>,
    session_key: Zeroizing<Vec<u8>>,
    nonce_tpm: Vec<u8>,
    nonce_caller: Vec<u8>,
    encryption: bool,
}

impl HmacAuthorizationDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_handle(&self) -> Option<u32> {
        self.handle
    }

    /// Derived session key; empty for an unsalted, unbound session
    pub fn session_key(&self) -> &[u8] {
        &self.session_key
    }

    pub fn nonce_tpm(&self) -> &[u8] {
        &self.nonce_tpm
    }

    pub fn nonce_caller(&self) -> &[u8] {
        &self.nonce_caller
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryption
    }
}

impl AuthorizationDelegate for HmacAuthorizationDelegate {
    fn init_session(&mut self, seed: &SessionSeed<'_>) -> Result<()> {
        if !(MIN_TPM_NONCE_SIZE..=MAX_TPM_NONCE_SIZE).contains(&seed.nonce_tpm.len()) {
            bail!("TPM nonce has invalid size {}", seed.nonce_tpm.len());
        }
        if seed.nonce_caller.len() < MIN_NONCE_SIZE {
            bail!("caller nonce has invalid size {}", seed.nonce_caller.len());
        }

        let mut key_material =
            Zeroizing::new(Vec::with_capacity(seed.bind_auth.len() + seed.salt.len()));
        key_material.extend_from_slice(seed.bind_auth);
        key_material.extend_from_slice(seed.salt);

        self.session_key = if key_material.is_empty() {
            Zeroizing::new(Vec::new())
        } else {
            let bits = (TpmAlgId::Sha256.digest_size() * 8) as u32;
            kdfa(
                &key_material,
                SESSION_KEY_LABEL,
                seed.nonce_tpm,
                seed.nonce_caller,
                bits,
            )?
        };
        self.handle = Some(seed.handle);
        self.nonce_tpm = seed.nonce_tpm.to_vec();
        self.nonce_caller = seed.nonce_caller.to_vec();
        self.encryption = seed.enable_encryption;

        debug!(
            "session 0x{:08x} keyed (encryption: {})",
            seed.handle, seed.enable_encryption
        );
        Ok(())
    }
}
