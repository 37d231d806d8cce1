// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types

use anyhow::{anyhow, bail, Result};

use super::constants::*;
use super::marshal::*;

/// TPMT_SYM_DEF - Symmetric algorithm definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl TpmtSymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }

    pub fn aes_128_cfb() -> Self {
        Self {
            algorithm: TpmAlgId::Aes,
            key_bits: 128,
            mode: TpmAlgId::Cfb,
        }
    }
}

impl Marshal for TpmtSymDef {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.algorithm.to_u16());
        if self.algorithm != TpmAlgId::Null {
            buf.put_u16(self.key_bits);
            buf.put_u16(self.mode.to_u16());
        }
    }
}

impl Unmarshal for TpmtSymDef {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let alg = buf.get_u16()?;
        let algorithm =
            TpmAlgId::from_u16(alg).ok_or_else(|| anyhow!("unknown algorithm: 0x{:04x}", alg))?;
        if algorithm == TpmAlgId::Null {
            return Ok(Self::null());
        }
        let key_bits = buf.get_u16()?;
        let mode_raw = buf.get_u16()?;
        let mode =
            TpmAlgId::from_u16(mode_raw).ok_or_else(|| anyhow!("unknown mode: 0x{:04x}", mode_raw))?;
        Ok(Self {
            algorithm,
            key_bits,
            mode,
        })
    }
}

/// RSA public area (TPMT_PUBLIC with `type == TPM_ALG_RSA`)
///
/// Only the fields needed to encrypt to the key are interpreted; the rest
/// are carried through so the area can be re-marshalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicArea {
    pub name_alg: TpmAlgId,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub symmetric: TpmtSymDef,
    /// Raw `TPMT_RSA_SCHEME`: scheme id and, if not null, its hash
    pub scheme: (u16, Option<u16>),
    pub key_bits: u16,
    /// Raw exponent field; zero means the default of 65537
    pub exponent: u32,
    /// Big-endian modulus
    pub modulus: Vec<u8>,
}

impl RsaPublicArea {
    /// Effective public exponent
    pub fn exponent(&self) -> u32 {
        if self.exponent == 0 {
            RSA_DEFAULT_EXPONENT
        } else {
            self.exponent
        }
    }
}

impl Marshal for RsaPublicArea {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(TpmAlgId::Rsa.to_u16());
        buf.put_u16(self.name_alg.to_u16());
        buf.put_u32(self.object_attributes);
        buf.put_tpm2b(&self.auth_policy);
        self.symmetric.marshal(buf);
        buf.put_u16(self.scheme.0);
        if let Some(hash) = self.scheme.1 {
            buf.put_u16(hash);
        }
        buf.put_u16(self.key_bits);
        buf.put_u32(self.exponent);
        buf.put_tpm2b(&self.modulus);
    }
}

impl Unmarshal for RsaPublicArea {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let object_type = buf.get_u16()?;
        if object_type != TpmAlgId::Rsa.to_u16() {
            bail!("public area is not an RSA key: type 0x{:04x}", object_type);
        }
        let name_alg_raw = buf.get_u16()?;
        let name_alg = TpmAlgId::from_u16(name_alg_raw)
            .ok_or_else(|| anyhow!("unknown name algorithm: 0x{:04x}", name_alg_raw))?;
        let object_attributes = buf.get_u32()?;
        let auth_policy = buf.get_tpm2b()?;
        let symmetric = TpmtSymDef::unmarshal(buf)?;
        let scheme_id = buf.get_u16()?;
        let scheme_hash = if scheme_id == TpmAlgId::Null.to_u16() {
            None
        } else {
            Some(buf.get_u16()?)
        };
        let key_bits = buf.get_u16()?;
        let exponent = buf.get_u32()?;
        let modulus = buf.get_tpm2b()?;
        if modulus.len() * 8 != key_bits as usize {
            bail!(
                "RSA modulus is {} bits but key claims {}",
                modulus.len() * 8,
                key_bits
            );
        }
        Ok(Self {
            name_alg,
            object_attributes,
            auth_policy,
            symmetric,
            scheme: (scheme_id, scheme_hash),
            key_bits,
            exponent,
            modulus,
        })
    }
}

/// TPM2B_PUBLIC - Public area with size prefix
#[derive(Debug, Clone)]
pub struct Tpm2bPublic {
    pub public_area: Vec<u8>, // Raw marshalled TPMT_PUBLIC
}

impl Tpm2bPublic {
    /// Interpret the public area as an RSA key
    pub fn rsa(&self) -> Result<RsaPublicArea> {
        let mut buf = ResponseBuffer::new(&self.public_area);
        let area = RsaPublicArea::unmarshal(&mut buf)?;
        if buf.remaining() != 0 {
            bail!("{} trailing bytes after RSA public area", buf.remaining());
        }
        Ok(area)
    }
}

impl Marshal for Tpm2bPublic {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.public_area);
    }
}

impl Unmarshal for Tpm2bPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let public_area = buf.get_tpm2b()?;
        Ok(Self { public_area })
    }
}
