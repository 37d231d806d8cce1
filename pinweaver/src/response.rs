// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver response decoding
//!
//! Every response starts with `version u8 | data_length u16 | result_code u32
//! | root[32]`. The total length must match the header exactly. A result code
//! other than success is data, returned to the caller, but the firmware must
//! then send no payload unless the message defines one for that code.

use std::fmt;

use hwsec_tpm2::ResponseBuffer;
use tracing::error;
use zeroize::Zeroizing;

use super::constants::*;
use super::error::{CodecError, Result};
use super::leaf::LeafData;
use super::log::{decode_log, LogEntry};
use super::version::ProtocolVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub data_length: u16,
    pub result_code: ResultCode,
    pub root: RootHash,
}

/// Result code and root; the whole response for ResetTree and RemoveLeaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertLeafResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
    /// Present on success only
    pub leaf: Option<LeafData>,
}

/// Outcome of a TryAuth
///
/// `he_secret` and `reset_secret` are filled on success only. A rate-limited
/// attempt carries just `seconds_to_wait`; a wrong low-entropy secret still
/// returns the updated leaf so the caller can store the new attempt count.
pub struct TryAuthResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
    pub seconds_to_wait: u32,
    pub he_secret: Zeroizing<Vec<u8>>,
    pub reset_secret: Zeroizing<Vec<u8>>,
    pub leaf: Option<LeafData>,
}

pub struct ResetAuthResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
    pub he_secret: Zeroizing<Vec<u8>>,
    pub leaf: Option<LeafData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLogResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReplayResponse {
    pub result_code: ResultCode,
    pub root: RootHash,
    pub leaf: Option<LeafData>,
}

impl fmt::Debug for TryAuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryAuthResponse")
            .field("result_code", &self.result_code)
            .field("root", &hex::encode(self.root))
            .field("seconds_to_wait", &self.seconds_to_wait)
            .field("he_secret", &format_args!("<{} bytes>", self.he_secret.len()))
            .field(
                "reset_secret",
                &format_args!("<{} bytes>", self.reset_secret.len()),
            )
            .field("leaf", &self.leaf)
            .finish()
    }
}

impl fmt::Debug for ResetAuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetAuthResponse")
            .field("result_code", &self.result_code)
            .field("root", &hex::encode(self.root))
            .field("he_secret", &format_args!("<{} bytes>", self.he_secret.len()))
            .field("leaf", &self.leaf)
            .finish()
    }
}

/// Parse and length-check the response header
pub fn parse_header(buffer: &[u8]) -> Result<ResponseHeader> {
    let Some(&version) = buffer.first() else {
        return Err(CodecError::InsufficientBuffer);
    };
    if version > PW_PROTOCOL_VERSION {
        error!(
            "PinWeaver protocol version mismatch: got {}, expected {} or lower",
            version, PW_PROTOCOL_VERSION
        );
        return Err(CodecError::AbiMismatch {
            version,
            max: PW_PROTOCOL_VERSION,
        });
    }
    if buffer.len() < PW_RESPONSE_HEADER_SIZE {
        error!("PinWeaver response is only {} bytes", buffer.len());
        return Err(CodecError::InsufficientBuffer);
    }

    let mut buf = ResponseBuffer::new(buffer);
    buf.skip(1)?;
    let data_length = buf.get_u16_le()?;
    let result_code = ResultCode(buf.get_u32_le()?);
    let root = buf.get_array()?;

    let expected = PW_RESPONSE_HEADER_SIZE + data_length as usize;
    if buffer.len() != expected {
        error!(
            "PinWeaver response contained {} bytes instead of {}",
            buffer.len(),
            expected
        );
        return Err(CodecError::BadSize {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(ResponseHeader {
        version,
        data_length,
        result_code,
        root,
    })
}

fn payload(buffer: &[u8]) -> &[u8] {
    &buffer[PW_RESPONSE_HEADER_SIZE..]
}

/// A message that carries no payload whatever its result
fn require_empty(header: &ResponseHeader) -> Result<()> {
    if header.data_length != 0 {
        return Err(CodecError::BadSize {
            expected: PW_RESPONSE_HEADER_SIZE,
            actual: PW_RESPONSE_HEADER_SIZE + header.data_length as usize,
        });
    }
    Ok(())
}

pub fn parse_short_message(buffer: &[u8]) -> Result<ShortResponse> {
    let header = parse_header(buffer)?;
    require_empty(&header)?;
    Ok(ShortResponse {
        result_code: header.result_code,
        root: header.root,
    })
}

/// Decode the reply to a ping and return the firmware's highest version
///
/// Firmware answers the invalid message type with `PW_ERR_TYPE_INVALID`;
/// anything else means it does not speak this protocol.
pub fn parse_pong(buffer: &[u8]) -> Result<u8> {
    let header = parse_header(buffer)?;
    require_empty(&header)?;
    if header.result_code != ResultCode::TYPE_INVALID {
        return Err(CodecError::AbiMismatch {
            version: header.version,
            max: PW_PROTOCOL_VERSION,
        });
    }
    Ok(header.version)
}

pub fn parse_reset_tree(buffer: &[u8]) -> Result<ShortResponse> {
    parse_short_message(buffer)
}

pub fn parse_remove_leaf(buffer: &[u8]) -> Result<ShortResponse> {
    parse_short_message(buffer)
}

pub fn parse_insert_leaf(buffer: &[u8]) -> Result<InsertLeafResponse> {
    let header = parse_header(buffer)?;
    let leaf = if header.result_code.is_success() {
        Some(LeafData::parse(payload(buffer))?)
    } else {
        require_empty(&header)?;
        None
    };
    Ok(InsertLeafResponse {
        result_code: header.result_code,
        root: header.root,
        leaf,
    })
}

/// Decode a TryAuth reply using the layout of `version`
pub fn parse_try_auth(version: ProtocolVersion, buffer: &[u8]) -> Result<TryAuthResponse> {
    let header = parse_header(buffer)?;
    let mut response = TryAuthResponse {
        result_code: header.result_code,
        root: header.root,
        seconds_to_wait: 0,
        he_secret: Zeroizing::new(Vec::new()),
        reset_secret: Zeroizing::new(Vec::new()),
        leaf: None,
    };

    let code = header.result_code;
    if !code.is_success()
        && code != ResultCode::RATE_LIMIT_REACHED
        && code != ResultCode::LOWENT_AUTH_FAILED
    {
        require_empty(&header)?;
        return Ok(response);
    }

    let secrets_size = if version.has_reset_secret() {
        2 * PW_SECRET_SIZE
    } else {
        PW_SECRET_SIZE
    };
    let fixed_size = 4 + secrets_size + PW_LEAF_HEADER_SIZE;
    let data = payload(buffer);
    if data.len() < fixed_size {
        return Err(CodecError::BadSize {
            expected: PW_RESPONSE_HEADER_SIZE + fixed_size,
            actual: buffer.len(),
        });
    }

    let mut buf = ResponseBuffer::new(data);
    response.seconds_to_wait = buf.get_u32_le()?;
    let he_secret = buf.take(PW_SECRET_SIZE)?;
    let reset_secret = if version.has_reset_secret() {
        buf.take(PW_SECRET_SIZE)?
    } else {
        &[]
    };
    if code.is_success() {
        response.he_secret.extend_from_slice(he_secret);
        response.reset_secret.extend_from_slice(reset_secret);
    }
    if code == ResultCode::RATE_LIMIT_REACHED {
        return Ok(response);
    }

    response.leaf = Some(LeafData::parse(&data[buf.position()..])?);
    Ok(response)
}

pub fn parse_reset_auth(buffer: &[u8]) -> Result<ResetAuthResponse> {
    let header = parse_header(buffer)?;
    let mut response = ResetAuthResponse {
        result_code: header.result_code,
        root: header.root,
        he_secret: Zeroizing::new(Vec::new()),
        leaf: None,
    };
    if !header.result_code.is_success() {
        require_empty(&header)?;
        return Ok(response);
    }

    let data = payload(buffer);
    if data.len() < PW_SECRET_SIZE + PW_LEAF_HEADER_SIZE {
        error!("PinWeaver ResetAuth response contained {} bytes", data.len());
        return Err(CodecError::BadSize {
            expected: PW_RESPONSE_HEADER_SIZE + PW_SECRET_SIZE + PW_LEAF_HEADER_SIZE,
            actual: buffer.len(),
        });
    }
    let leaf = LeafData::parse(&data[PW_SECRET_SIZE..])?;
    response.he_secret.extend_from_slice(&data[..PW_SECRET_SIZE]);
    response.leaf = Some(leaf);
    Ok(response)
}

pub fn parse_get_log(buffer: &[u8]) -> Result<GetLogResponse> {
    let header = parse_header(buffer)?;
    let entries = if header.result_code.is_success() {
        decode_log(payload(buffer))?
    } else {
        require_empty(&header)?;
        Vec::new()
    };
    Ok(GetLogResponse {
        result_code: header.result_code,
        root: header.root,
        entries,
    })
}

pub fn parse_log_replay(buffer: &[u8]) -> Result<LogReplayResponse> {
    let header = parse_header(buffer)?;
    let leaf = if header.result_code.is_success() {
        Some(LeafData::parse(payload(buffer))?)
    } else {
        require_empty(&header)?;
        None
    };
    Ok(LogReplayResponse {
        result_code: header.result_code,
        root: header.root,
        leaf,
    })
}
