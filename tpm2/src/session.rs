// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Salted HMAC authorization sessions

use tracing::{debug, warn};

use super::commands::flush_context;
use super::config::SessionConfig;
use super::constants::*;
use super::delegate::{AuthorizationDelegate, SessionSeed};
use super::error::{Result, SessionError};
use super::salt::{random_bytes, PersistentSaltingKey, SaltEncryptor, SaltingKeySource};
use super::transport::*;
use super::types::*;

/// Handle range of HMAC sessions (TPM_HT_HMAC_SESSION)
const HMAC_SESSION_HANDLE_TYPE: u32 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Active,
    Closed,
}

/// An established session as seen by the TPM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub handle: u32,
    /// Entity the session is bound to, `None` for an unbound session
    pub bound_entity: Option<u32>,
    pub encryption: bool,
}

/// Owns at most one salted HMAC session at a time
///
/// Starting a session always closes the previous one first. The session is
/// flushed when the manager is dropped.
pub struct SessionManager<T: Transport, S: SaltingKeySource = PersistentSaltingKey> {
    transport: T,
    config: SessionConfig,
    salt_encryptor: SaltEncryptor<S>,
    session: Option<SessionInfo>,
    state: SessionState,
}

impl<T: Transport> SessionManager<T> {
    /// Create a manager salting sessions with the persistent key from `config`
    pub fn new(transport: T, config: SessionConfig) -> Result<Self> {
        let source = PersistentSaltingKey {
            handle: config.salting_key_handle,
        };
        Self::with_salting_key(transport, config, source)
    }
}

impl<T: Transport, S: SaltingKeySource> SessionManager<T, S> {
    /// Create a manager salting sessions with the key behind `source`
    ///
    /// `source` decides the `tpmKey` handle; `config.salting_key_handle` is
    /// only read by [`SessionManager::new`].
    pub fn with_salting_key(transport: T, config: SessionConfig, source: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            salt_encryptor: SaltEncryptor::new(source),
            session: None,
            state: SessionState::Uninitialized,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Handle of the active session, if any
    pub fn session_handle(&self) -> Option<u32> {
        self.session.map(|s| s.handle)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start a salted session bound to `bind_entity` whose auth value is `bind_auth`
    pub fn start_bound_session(
        &mut self,
        bind_entity: u32,
        bind_auth: &[u8],
        enable_encryption: bool,
        delegate: &mut dyn AuthorizationDelegate,
    ) -> Result<u32> {
        self.start_session(Some(bind_entity), bind_auth, enable_encryption, delegate)
    }

    /// Start a salted session not bound to any entity
    pub fn start_unbound_session(
        &mut self,
        enable_encryption: bool,
        delegate: &mut dyn AuthorizationDelegate,
    ) -> Result<u32> {
        self.start_session(None, &[], enable_encryption, delegate)
    }

    /// Flush the active session, if any
    ///
    /// Flush failures are logged and otherwise ignored; the handle is
    /// forgotten either way.
    pub fn close_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(err) = flush_context(&mut self.transport, session.handle) {
            warn!(
                "failed to flush session 0x{:08x}: {:#}",
                session.handle, err
            );
        }
        debug!("session 0x{:08x} closed", session.handle);
        self.state = SessionState::Closed;
    }

    fn start_session(
        &mut self,
        bind_entity: Option<u32>,
        bind_auth: &[u8],
        enable_encryption: bool,
        delegate: &mut dyn AuthorizationDelegate,
    ) -> Result<u32> {
        self.close_session();
        self.state = SessionState::Starting;

        match self.establish(bind_entity, bind_auth, enable_encryption, delegate) {
            Ok(handle) => {
                self.session = Some(SessionInfo {
                    handle,
                    bound_entity: bind_entity,
                    encryption: enable_encryption,
                });
                self.state = SessionState::Active;
                debug!("session 0x{:08x} active", handle);
                Ok(handle)
            }
            Err(err) => {
                self.state = SessionState::Uninitialized;
                Err(err)
            }
        }
    }

    fn establish(
        &mut self,
        bind_entity: Option<u32>,
        bind_auth: &[u8],
        enable_encryption: bool,
        delegate: &mut dyn AuthorizationDelegate,
    ) -> Result<u32> {
        let salt = self.salt_encryptor.generate_salt()?;
        let encrypted_salt = self
            .salt_encryptor
            .encrypt_salt(&mut self.transport, &salt)?;
        let nonce_caller = random_bytes(self.config.nonce_size)?;

        let (handle, nonce_tpm) = self.start_auth_session(
            bind_entity.unwrap_or(tpm_rh::NULL),
            &nonce_caller,
            &encrypted_salt,
        )?;

        let seed = SessionSeed {
            handle,
            nonce_tpm: &nonce_tpm,
            nonce_caller: &nonce_caller,
            salt: &salt,
            bind_auth,
            enable_encryption,
        };
        if let Err(err) = delegate.init_session(&seed) {
            self.flush_abandoned(handle);
            return Err(SessionError::Derivation(err));
        }
        Ok(handle)
    }

    /// Issue `TPM2_StartAuthSession` and return the session handle and nonceTPM
    fn start_auth_session(
        &mut self,
        bind: u32,
        nonce_caller: &[u8],
        encrypted_salt: &[u8],
    ) -> Result<(u32, Vec<u8>)> {
        const COMMAND: TpmCc = TpmCc::StartAuthSession;

        let mut cmd = TpmCommand::new(COMMAND);
        // tpmKey
        cmd.add_handle(self.salt_encryptor.key_handle());
        // bind
        cmd.add_handle(bind);
        cmd.add_tpm2b(nonce_caller);
        cmd.add_tpm2b(encrypted_salt);
        cmd.add_u8(TpmSe::Hmac as u8);
        cmd.add(&TpmtSymDef::aes_128_cfb());
        // authHash
        cmd.add_u16(TpmAlgId::Sha256.to_u16());

        let cmd_bytes = cmd.finalize();
        debug!("StartAuthSession command: {} bytes", cmd_bytes.len());
        let response_bytes = self
            .transport
            .transmit(&cmd_bytes)
            .map_err(|source| SessionError::Transport {
                command: COMMAND,
                source,
            })?;
        let response = TpmResponse::parse(&response_bytes)
            .map_err(|source| SessionError::Malformed {
                command: COMMAND,
                source,
            })?;
        if !response.is_success() {
            return Err(SessionError::Tpm {
                command: COMMAND,
                code: response.response_code,
            });
        }

        let mut buf = response.data_buffer();
        let handle = buf.get_u32().map_err(|e| SessionError::Malformed {
            command: COMMAND,
            source: e.into(),
        })?;
        let nonce_tpm = match buf.get_tpm2b() {
            Ok(nonce) => nonce,
            Err(e) => {
                self.flush_abandoned(handle);
                return Err(SessionError::Malformed {
                    command: COMMAND,
                    source: e.into(),
                });
            }
        };
        if handle >> 24 != HMAC_SESSION_HANDLE_TYPE {
            self.flush_abandoned(handle);
            return Err(SessionError::Malformed {
                command: COMMAND,
                source: anyhow::anyhow!("0x{:08x} is not an HMAC session handle", handle),
            });
        }
        Ok((handle, nonce_tpm))
    }

    fn flush_abandoned(&mut self, handle: u32) {
        if let Err(err) = flush_context(&mut self.transport, handle) {
            warn!(
                "failed to flush abandoned session 0x{:08x}: {:#}",
                handle, err
            );
        }
    }
}

impl<T: Transport, S: SaltingKeySource> Drop for SessionManager<T, S> {
    fn drop(&mut self) {
        self.close_session();
    }
}
