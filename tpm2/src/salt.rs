// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Session salt generation and encryption to the TPM salting key

use anyhow::{bail, Context};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{BigUint, Oaep, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::commands::read_public;
use super::constants::*;
use super::error::{Result, SessionError};
use super::transport::Transport;

/// Source of the salting key's public RSA modulus
///
/// The session is started with `handle()` as `tpmKey`, so the modulus must
/// belong to the key loaded at that handle.
pub trait SaltingKeySource {
    /// Handle of the salting key inside the TPM
    fn handle(&self) -> u32;

    /// Return the big-endian modulus; the exponent is always 65537
    fn public_modulus(&mut self, transport: &mut dyn Transport) -> anyhow::Result<Vec<u8>>;
}

/// Salting key stored at a persistent handle, read with `TPM2_ReadPublic`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSaltingKey {
    pub handle: u32,
}

impl Default for PersistentSaltingKey {
    fn default() -> Self {
        Self {
            handle: persistent::SALTING_KEY,
        }
    }
}

impl SaltingKeySource for PersistentSaltingKey {
    fn handle(&self) -> u32 {
        self.handle
    }

    fn public_modulus(&mut self, transport: &mut dyn Transport) -> anyhow::Result<Vec<u8>> {
        let public = read_public(transport, self.handle)?;
        let area = public.rsa().context("salting key public area")?;
        if area.exponent() != RSA_DEFAULT_EXPONENT {
            bail!(
                "salting key uses exponent {}, expected {}",
                area.exponent(),
                RSA_DEFAULT_EXPONENT
            );
        }
        Ok(area.modulus)
    }
}

/// Fill a fresh zeroizing buffer from the OS CSPRNG
pub fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::Random(e.into()))?;
    Ok(bytes)
}

/// RSA-OAEP(SHA-256, label `"SECRET\0"`) encryption under `modulus`, e = 65537
pub fn encrypt_with_modulus(modulus: &[u8], plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from(RSA_DEFAULT_EXPONENT),
    )
    .context("invalid salting key")?;
    let padding = Oaep::new_with_label::<Sha256, _>(SALT_OAEP_LABEL);
    key.encrypt(&mut OsRng, padding, plaintext)
        .context("RSA-OAEP encryption failed")
}

/// Produces salts and encrypts them so only the TPM can recover them
pub struct SaltEncryptor<S = PersistentSaltingKey> {
    source: S,
}

impl<S: SaltingKeySource> SaltEncryptor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Handle of the key salts are encrypted to
    pub fn key_handle(&self) -> u32 {
        self.source.handle()
    }

    /// Generate a new 32-byte session salt
    pub fn generate_salt(&self) -> Result<Zeroizing<Vec<u8>>> {
        random_bytes(SALT_SIZE)
    }

    /// Encrypt `salt` to the salting key
    pub fn encrypt_salt(&mut self, transport: &mut dyn Transport, salt: &[u8]) -> Result<Vec<u8>> {
        let modulus = self
            .source
            .public_modulus(transport)
            .map_err(SessionError::SaltingKey)?;
        debug!("salting key modulus: {} bits", modulus.len() * 8);
        encrypt_with_modulus(&modulus, salt).map_err(SessionError::Encryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    struct FixedModulus(Vec<u8>);

    impl SaltingKeySource for FixedModulus {
        fn handle(&self) -> u32 {
            persistent::SALTING_KEY
        }

        fn public_modulus(&mut self, _: &mut dyn Transport) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn transmit(&mut self, _: &[u8]) -> anyhow::Result<Vec<u8>> {
            bail!("no TPM")
        }
    }

    #[test]
    fn test_salt_decrypts_with_secret_label() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let modulus = private.to_public_key().n().to_bytes_be();
        let mut encryptor = SaltEncryptor::new(FixedModulus(modulus));

        let salt = encryptor.generate_salt().unwrap();
        assert_eq!(salt.len(), SALT_SIZE);

        let encrypted = encryptor.encrypt_salt(&mut Unreachable, &salt).unwrap();
        assert_eq!(encrypted.len(), 128);

        let padding = Oaep::new_with_label::<Sha256, _>("SECRET\0");
        let decrypted = private.decrypt(padding, &encrypted).unwrap();
        assert_eq!(decrypted, salt.as_slice());

        let without_nul = Oaep::new_with_label::<Sha256, _>("SECRET");
        assert!(private.decrypt(without_nul, &encrypted).is_err());
    }

    #[test]
    fn test_salts_are_fresh() {
        let encryptor = SaltEncryptor::new(PersistentSaltingKey::default());
        let a = encryptor.generate_salt().unwrap();
        let b = encryptor.generate_salt().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_fetch_failure_is_salting_key_error() {
        let mut encryptor = SaltEncryptor::new(PersistentSaltingKey::default());
        let err = encryptor
            .encrypt_salt(&mut Unreachable, &[0u8; SALT_SIZE])
            .unwrap_err();
        assert!(matches!(err, SessionError::SaltingKey(_)));
    }

    #[test]
    fn test_degenerate_modulus_is_encryption_error() {
        let mut encryptor = SaltEncryptor::new(FixedModulus(vec![0x01]));
        let err = encryptor
            .encrypt_salt(&mut Unreachable, &[0u8; SALT_SIZE])
            .unwrap_err();
        assert!(matches!(err, SessionError::Encryption(_)));
    }
}
