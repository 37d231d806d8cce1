// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 constants and command codes

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCc {
    StartAuthSession = 0x00000176,
    FlushContext = 0x00000165,
    ReadPublic = 0x00000173,
    /// Cr50 vendor command (vendor bit set, command index 0)
    Cr50Vendor = 0x20000000,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            TpmCc::StartAuthSession => "StartAuthSession",
            TpmCc::FlushContext => "FlushContext",
            TpmCc::ReadPublic => "ReadPublic",
            TpmCc::Cr50Vendor => "Cr50Vendor",
        }
    }
}

/// Cr50 vendor subcommand codes
pub mod cr50_subcmd {
    pub const PINWEAVER: u16 = 37;
}

/// TPM 2.0 Response Codes (TPM_RC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmRc {
    Success = 0x00000000,
    Failure = 0x00000101,
    Value = 0x00000184,
    Handle = 0x0000008B,
}

impl TpmRc {
    /// `None` for any code without a variant here
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x00000000 => Some(TpmRc::Success),
            0x00000101 => Some(TpmRc::Failure),
            0x00000184 => Some(TpmRc::Value),
            0x0000008B => Some(TpmRc::Handle),
            _ => None,
        }
    }
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmAlgId {
    Null = 0x0010,
    Sha1 = 0x0004,
    Sha256 = 0x000B,
    Rsa = 0x0001,
    Aes = 0x0006,
    Cfb = 0x0043,
    Oaep = 0x0017,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0010 => Some(TpmAlgId::Null),
            0x0004 => Some(TpmAlgId::Sha1),
            0x000B => Some(TpmAlgId::Sha256),
            0x0001 => Some(TpmAlgId::Rsa),
            0x0006 => Some(TpmAlgId::Aes),
            0x0043 => Some(TpmAlgId::Cfb),
            0x0017 => Some(TpmAlgId::Oaep),
            _ => None,
        }
    }

    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            _ => 0,
        }
    }
}

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const NULL: u32 = 0x40000007;
    pub const ENDORSEMENT: u32 = 0x4000000B;
}

/// Well-known persistent object handles
pub mod persistent {
    pub const SALTING_KEY: u32 = 0x81000001;
}

/// TPM 2.0 Session Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TpmSe {
    Hmac = 0x00,
}

/// TPM 2.0 Structure Tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    NoSessions = 0x8001,
    Sessions = 0x8002,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            _ => None,
        }
    }
}

/// Public exponent used when a TPM RSA public area reports zero
pub const RSA_DEFAULT_EXPONENT: u32 = 65537;

/// OAEP label for encrypting a session salt ("SECRET" plus the NUL byte)
pub const SALT_OAEP_LABEL: &str = "SECRET\0";

/// Size of a session salt in bytes (SHA-256 digest size)
pub const SALT_SIZE: usize = 32;

/// Minimum caller nonce size accepted by the TPM for SHA-256 sessions
pub const MIN_NONCE_SIZE: usize = 20;
