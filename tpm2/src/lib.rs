// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM 2.0 session plumbing
//!
//! This crate builds and parses TPM 2.0 commands without C library
//! dependencies. The caller supplies the [`Transport`] that carries bytes to
//! the TPM.
//!
//! ## Features
//!
//! - **Salted HMAC sessions**: a random salt is RSA-OAEP encrypted to the
//!   TPM's salting key and fed into the session key derivation
//! - **Vendor commands**: Cr50 vendor command framing used by PinWeaver
//!
//! ## Supported Commands
//!
//! - Sessions: `StartAuthSession`, `FlushContext`
//! - Objects: `ReadPublic`
//! - Cr50 extension: vendor command envelope
//!
//! ## Example
//!
//! ```no_run
//! use hwsec_tpm2::{HmacAuthorizationDelegate, SessionConfig, SessionManager, Transport};
//!
//! fn open(tpm: impl Transport) -> anyhow::Result<()> {
//!     let mut sessions = SessionManager::new(tpm, SessionConfig::default())?;
//!     let mut delegate = HmacAuthorizationDelegate::new();
//!     let handle = sessions.start_unbound_session(true, &mut delegate)?;
//!     println!("session 0x{:08x}", handle);
//!     Ok(())
//! }
//! ```

mod commands;
mod config;
mod constants;
mod delegate;
mod error;
mod marshal;
mod salt;
mod session;
mod transport;
mod types;

pub use commands::{flush_context, read_public, vendor_command};
pub use config::SessionConfig;
pub use constants::*;
pub use delegate::{kdfa, AuthorizationDelegate, HmacAuthorizationDelegate, SessionSeed};
pub use error::SessionError;
pub use marshal::{CommandBuffer, Marshal, MarshalError, ResponseBuffer, Unmarshal};
pub use salt::{
    encrypt_with_modulus, random_bytes, PersistentSaltingKey, SaltEncryptor, SaltingKeySource,
};
pub use session::{SessionInfo, SessionManager, SessionState};
pub use transport::{TpmCommand, TpmResponse, Transport, TPM_RESPONSE_HEADER_SIZE};
pub use types::*;
