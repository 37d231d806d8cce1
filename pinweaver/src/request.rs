// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver request encoding
//!
//! Every request starts with `version u8 | type u8 | data_length u16` and all
//! multi-byte fields are little-endian. Encoders validate sizes up front and
//! never emit a partial request.

use std::collections::BTreeMap;

use hwsec_tpm2::CommandBuffer;

use super::constants::*;
use super::error::{CodecError, Result};
use super::leaf::validate_cred_metadata;
use super::tree::Label;
use super::version::ProtocolVersion;

/// Attempt count → seconds to wait before the next attempt
pub type DelaySchedule = BTreeMap<u32, u32>;

/// One acceptable PCR state for a leaf (protocol version 1 and later)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPcrValue {
    /// PCR selection; bit `n` of byte `n / 8` selects PCR `n`
    pub bitmask: [u8; 2],
    /// SHA-256 over the selected PCR values
    pub digest: Vec<u8>,
}

/// Parameters of an InsertLeaf request
#[derive(Debug, Clone, Copy)]
pub struct InsertLeafRequest<'a> {
    pub label: Label,
    pub h_aux: &'a [u8],
    pub le_secret: &'a [u8],
    pub he_secret: &'a [u8],
    pub reset_secret: &'a [u8],
    pub delay_schedule: &'a DelaySchedule,
    pub valid_pcr_criteria: &'a [ValidPcrValue],
}

struct Request {
    buf: CommandBuffer,
}

impl Request {
    /// Start a request whose body will be exactly `data_length` bytes
    ///
    /// The buffer never grows, so no unwiped copy of a secret is left behind
    /// by a reallocation.
    fn new(version: u8, message_type: MessageType, data_length: usize) -> Self {
        let mut buf = CommandBuffer::with_capacity(PW_REQUEST_HEADER_SIZE + data_length);
        buf.put_u8(version);
        buf.put_u8(message_type.to_u8());
        buf.put_u16_le(0); // Length placeholder
        Self { buf }
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let data_length = self.buf.len() - PW_REQUEST_HEADER_SIZE;
        let data_length = u16::try_from(data_length)
            .map_err(|_| CodecError::BadParameter("request too large"))?;
        self.buf.update_u16_le(2, data_length);
        Ok(self.buf.into_vec())
    }
}

fn check_aux_path(h_aux: &[u8]) -> Result<()> {
    if h_aux.len() > PW_MAX_PATH_SIZE {
        return Err(CodecError::BadParameter("h_aux"));
    }
    Ok(())
}

fn check_size(value: &[u8], size: usize, what: &'static str) -> Result<()> {
    if value.len() != size {
        return Err(CodecError::BadParameter(what));
    }
    Ok(())
}

fn check_metadata(cred_metadata: &[u8]) -> Result<()> {
    validate_cred_metadata(cred_metadata).map_err(|_| CodecError::BadParameter("cred_metadata"))
}

/// Version probe; `requested` is not checked against what we implement
pub fn encode_ping(requested: u8) -> Vec<u8> {
    let mut buf = CommandBuffer::with_capacity(PW_REQUEST_HEADER_SIZE);
    buf.put_u8(requested);
    buf.put_u8(MessageType::Invalid.to_u8());
    buf.put_u16_le(0);
    buf.into_vec()
}

pub fn encode_reset_tree(
    version: ProtocolVersion,
    bits_per_level: u8,
    height: u8,
) -> Result<Vec<u8>> {
    let mut req = Request::new(version.get(), MessageType::ResetTree, 2);
    req.buf.put_u8(bits_per_level);
    req.buf.put_u8(height);
    req.finish()
}

pub fn encode_insert_leaf(
    version: ProtocolVersion,
    leaf: &InsertLeafRequest<'_>,
) -> Result<Vec<u8>> {
    check_aux_path(leaf.h_aux)?;
    check_size(leaf.le_secret, PW_SECRET_SIZE, "le_secret")?;
    check_size(leaf.he_secret, PW_SECRET_SIZE, "he_secret")?;
    check_size(leaf.reset_secret, PW_SECRET_SIZE, "reset_secret")?;
    if leaf.delay_schedule.len() > PW_SCHED_COUNT {
        return Err(CodecError::BadParameter("delay_schedule"));
    }
    if leaf.valid_pcr_criteria.len() > PW_MAX_PCR_CRITERIA_COUNT {
        return Err(CodecError::BadParameter("valid_pcr_criteria"));
    }
    if !version.has_pcr_criteria() && !leaf.valid_pcr_criteria.is_empty() {
        return Err(CodecError::BadParameter(
            "valid_pcr_criteria needs protocol version 1",
        ));
    }
    for value in leaf.valid_pcr_criteria {
        check_size(&value.digest, PW_HASH_SIZE, "valid_pcr_criteria digest")?;
    }

    let pcr_size = if version.has_pcr_criteria() {
        PW_MAX_PCR_CRITERIA_COUNT * (2 + PW_HASH_SIZE)
    } else {
        0
    };
    let data_length =
        8 + PW_SCHED_COUNT * 8 + 3 * PW_SECRET_SIZE + pcr_size + leaf.h_aux.len();
    let mut req = Request::new(version.get(), MessageType::InsertLeaf, data_length);
    req.buf.put_u64_le(leaf.label.value());

    // BTreeMap iterates in ascending attempt-count order
    for (&attempt_count, &time_diff) in leaf.delay_schedule {
        req.buf.put_u32_le(attempt_count);
        req.buf.put_u32_le(time_diff);
    }
    req.buf.put_zeros((PW_SCHED_COUNT - leaf.delay_schedule.len()) * 8);

    req.buf.put_bytes(leaf.le_secret);
    req.buf.put_bytes(leaf.he_secret);
    req.buf.put_bytes(leaf.reset_secret);

    if version.has_pcr_criteria() {
        for value in leaf.valid_pcr_criteria {
            req.buf.put_bytes(&value.bitmask);
            req.buf.put_bytes(&value.digest);
        }
        req.buf.put_zeros(
            (PW_MAX_PCR_CRITERIA_COUNT - leaf.valid_pcr_criteria.len()) * (2 + PW_HASH_SIZE),
        );
    }

    req.buf.put_bytes(leaf.h_aux);
    req.finish()
}

pub fn encode_remove_leaf(
    version: ProtocolVersion,
    label: Label,
    h_aux: &[u8],
    mac: &[u8],
) -> Result<Vec<u8>> {
    check_aux_path(h_aux)?;
    check_size(mac, PW_HASH_SIZE, "mac")?;

    let mut req = Request::new(
        version.get(),
        MessageType::RemoveLeaf,
        8 + PW_HASH_SIZE + h_aux.len(),
    );
    req.buf.put_u64_le(label.value());
    req.buf.put_bytes(mac);
    req.buf.put_bytes(h_aux);
    req.finish()
}

pub fn encode_try_auth(
    version: ProtocolVersion,
    le_secret: &[u8],
    h_aux: &[u8],
    cred_metadata: &[u8],
) -> Result<Vec<u8>> {
    check_size(le_secret, PW_SECRET_SIZE, "le_secret")?;
    check_aux_path(h_aux)?;
    check_metadata(cred_metadata)?;

    let mut req = Request::new(
        version.get(),
        MessageType::TryAuth,
        PW_SECRET_SIZE + cred_metadata.len() + h_aux.len(),
    );
    req.buf.put_bytes(le_secret);
    req.buf.put_bytes(cred_metadata);
    req.buf.put_bytes(h_aux);
    req.finish()
}

pub fn encode_reset_auth(
    version: ProtocolVersion,
    reset_secret: &[u8],
    h_aux: &[u8],
    cred_metadata: &[u8],
) -> Result<Vec<u8>> {
    check_size(reset_secret, PW_SECRET_SIZE, "reset_secret")?;
    check_aux_path(h_aux)?;
    check_metadata(cred_metadata)?;

    let mut req = Request::new(
        version.get(),
        MessageType::ResetAuth,
        PW_SECRET_SIZE + cred_metadata.len() + h_aux.len(),
    );
    req.buf.put_bytes(reset_secret);
    req.buf.put_bytes(cred_metadata);
    req.buf.put_bytes(h_aux);
    req.finish()
}

pub fn encode_get_log(version: ProtocolVersion, root: &[u8]) -> Result<Vec<u8>> {
    check_size(root, PW_HASH_SIZE, "root")?;

    let mut req = Request::new(version.get(), MessageType::GetLog, PW_HASH_SIZE);
    req.buf.put_bytes(root);
    req.finish()
}

pub fn encode_log_replay(
    version: ProtocolVersion,
    log_root: &[u8],
    h_aux: &[u8],
    cred_metadata: &[u8],
) -> Result<Vec<u8>> {
    check_size(log_root, PW_HASH_SIZE, "log_root")?;
    check_aux_path(h_aux)?;
    check_metadata(cred_metadata)?;

    let mut req = Request::new(
        version.get(),
        MessageType::LogReplay,
        PW_HASH_SIZE + cred_metadata.len() + h_aux.len(),
    );
    req.buf.put_bytes(log_root);
    req.buf.put_bytes(cred_metadata);
    req.buf.put_bytes(h_aux);
    req.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::tests::leaf_record;

    static SECRET: [u8; 32] = [0x5a; 32];

    fn schedule() -> DelaySchedule {
        [(5, 20), (6, 60), (50, PW_BLOCK_ATTEMPTS)].into_iter().collect()
    }

    fn insert<'a>(
        schedule: &'a DelaySchedule,
        pcr: &'a [ValidPcrValue],
    ) -> InsertLeafRequest<'a> {
        InsertLeafRequest {
            label: Label(0x1b1),
            h_aux: &[0x33; 96],
            le_secret: &SECRET,
            he_secret: &SECRET,
            reset_secret: &SECRET,
            delay_schedule: schedule,
            valid_pcr_criteria: pcr,
        }
    }

    fn header(bytes: &[u8]) -> (u8, u8, u16) {
        (bytes[0], bytes[1], u16::from_le_bytes([bytes[2], bytes[3]]))
    }

    #[test]
    fn test_ping_and_reset_tree() {
        assert_eq!(encode_ping(1), [1, 0, 0, 0]);
        assert_eq!(
            encode_reset_tree(ProtocolVersion::V1, 2, 6).unwrap(),
            [1, 1, 2, 0, 2, 6]
        );
    }

    #[test]
    fn test_insert_leaf_layout_v1() {
        let schedule = schedule();
        let pcr = [ValidPcrValue {
            bitmask: [0x10, 0],
            digest: vec![0xd1; 32],
        }];
        let bytes = encode_insert_leaf(ProtocolVersion::V1, &insert(&schedule, &pcr)).unwrap();

        // label + schedule + 3 secrets + 2 PCR slots + h_aux
        let data_length = 8 + 16 * 8 + 3 * 32 + 2 * 34 + 96;
        assert_eq!(header(&bytes), (1, 2, data_length as u16));
        assert_eq!(bytes.len(), 4 + data_length);

        let body = &bytes[4..];
        assert_eq!(&body[0..8], &0x1b1u64.to_le_bytes());
        assert_eq!(
            hex::encode(&body[8..32]),
            "0500000014000000060000003c00000032000000ffffffff"
        );
        assert!(body[32..136].iter().all(|&b| b == 0));
        assert_eq!(&body[136..232], &[0x5a; 96][..]);
        assert_eq!(&body[232..234], &[0x10, 0]);
        assert_eq!(&body[234..266], &[0xd1; 32][..]);
        assert!(body[266..300].iter().all(|&b| b == 0));
        assert_eq!(&body[300..], &[0x33; 96][..]);
    }

    #[test]
    fn test_insert_leaf_v0_omits_pcr_criteria() {
        let schedule = schedule();
        let bytes = encode_insert_leaf(ProtocolVersion::V0, &insert(&schedule, &[])).unwrap();
        let data_length = 8 + 16 * 8 + 3 * 32 + 96;
        assert_eq!(header(&bytes), (0, 2, data_length as u16));

        let pcr = [ValidPcrValue {
            bitmask: [1, 0],
            digest: vec![0; 32],
        }];
        assert!(matches!(
            encode_insert_leaf(ProtocolVersion::V0, &insert(&schedule, &pcr)),
            Err(CodecError::BadParameter(_))
        ));
    }

    #[test]
    fn test_insert_leaf_parameter_errors() {
        let schedule = schedule();
        let v1 = ProtocolVersion::V1;

        let long_path = [0u8; PW_MAX_PATH_SIZE + 1];
        let mut req = insert(&schedule, &[]);
        req.h_aux = &long_path;
        assert_eq!(
            encode_insert_leaf(v1, &req),
            Err(CodecError::BadParameter("h_aux"))
        );

        let full_path = [0u8; PW_MAX_PATH_SIZE];
        req.h_aux = &full_path;
        encode_insert_leaf(v1, &req).unwrap();

        let mut req = insert(&schedule, &[]);
        req.le_secret = &SECRET[..31];
        assert_eq!(
            encode_insert_leaf(v1, &req),
            Err(CodecError::BadParameter("le_secret"))
        );
        let mut req = insert(&schedule, &[]);
        req.he_secret = &[];
        assert_eq!(
            encode_insert_leaf(v1, &req),
            Err(CodecError::BadParameter("he_secret"))
        );
        let long_secret = [0u8; 33];
        let mut req = insert(&schedule, &[]);
        req.reset_secret = &long_secret;
        assert_eq!(
            encode_insert_leaf(v1, &req),
            Err(CodecError::BadParameter("reset_secret"))
        );

        let big_schedule: DelaySchedule = (1..=17).map(|n| (n, n)).collect();
        assert_eq!(
            encode_insert_leaf(v1, &insert(&big_schedule, &[])),
            Err(CodecError::BadParameter("delay_schedule"))
        );
        let full_schedule: DelaySchedule = (1..=16).map(|n| (n, n)).collect();
        encode_insert_leaf(v1, &insert(&full_schedule, &[])).unwrap();

        let value = ValidPcrValue {
            bitmask: [1, 0],
            digest: vec![0; 32],
        };
        let three = [value.clone(), value.clone(), value.clone()];
        assert_eq!(
            encode_insert_leaf(v1, &insert(&schedule, &three)),
            Err(CodecError::BadParameter("valid_pcr_criteria"))
        );
        let short_digest = [ValidPcrValue {
            bitmask: [1, 0],
            digest: b"bad_digest".to_vec(),
        }];
        assert!(encode_insert_leaf(v1, &insert(&schedule, &short_digest)).is_err());
    }

    #[test]
    fn test_remove_leaf() {
        let bytes =
            encode_remove_leaf(ProtocolVersion::V1, Label(7), &[0x44; 32], &[0xab; 32]).unwrap();
        assert_eq!(header(&bytes), (1, 3, 8 + 32 + 32));
        assert_eq!(&bytes[4..12], &7u64.to_le_bytes());
        assert_eq!(&bytes[12..44], &[0xab; 32][..]);
        assert_eq!(&bytes[44..], &[0x44; 32][..]);

        assert_eq!(
            encode_remove_leaf(ProtocolVersion::V1, Label(7), &[], &[0xab; 31]),
            Err(CodecError::BadParameter("mac"))
        );
    }

    #[test]
    fn test_try_auth_and_reset_auth() {
        let leaf = leaf_record(4, 16, 0xee);
        let bytes = encode_try_auth(ProtocolVersion::V1, &SECRET, &[0x44; 64], &leaf).unwrap();
        assert_eq!(header(&bytes), (1, 4, (32 + leaf.len() + 64) as u16));
        assert_eq!(&bytes[4..36], &SECRET);
        assert_eq!(&bytes[36..36 + leaf.len()], leaf.as_slice());

        let bytes = encode_reset_auth(ProtocolVersion::V0, &SECRET, &[], &leaf).unwrap();
        assert_eq!(header(&bytes), (0, 5, (32 + leaf.len()) as u16));

        let truncated = &leaf[..leaf.len() - 1];
        assert_eq!(
            encode_try_auth(ProtocolVersion::V1, &SECRET, &[], truncated),
            Err(CodecError::BadParameter("cred_metadata"))
        );
        assert_eq!(
            encode_reset_auth(ProtocolVersion::V1, &SECRET[..16], &[], &leaf),
            Err(CodecError::BadParameter("reset_secret"))
        );
    }

    #[test]
    fn test_secret_requests_never_reallocate() {
        let schedule = schedule();
        let pcr = [ValidPcrValue {
            bitmask: [0x10, 0],
            digest: vec![0xd1; 32],
        }];
        let full_path = [0x33; PW_MAX_PATH_SIZE];
        let mut req = insert(&schedule, &pcr);
        req.h_aux = &full_path;
        for version in [ProtocolVersion::V1, ProtocolVersion::V0] {
            if !version.has_pcr_criteria() {
                req.valid_pcr_criteria = &[];
            }
            let bytes = encode_insert_leaf(version, &req).unwrap();
            assert_eq!(bytes.capacity(), bytes.len());
        }

        let leaf = leaf_record(4, 16, 0xee);
        let bytes = encode_try_auth(ProtocolVersion::V1, &SECRET, &[0x44; 64], &leaf).unwrap();
        assert_eq!(bytes.capacity(), bytes.len());
        let bytes = encode_reset_auth(ProtocolVersion::V1, &SECRET, &[0x44; 64], &leaf).unwrap();
        assert_eq!(bytes.capacity(), bytes.len());
    }

    #[test]
    fn test_get_log_and_log_replay() {
        let bytes = encode_get_log(ProtocolVersion::V1, &[0x77; 32]).unwrap();
        assert_eq!(header(&bytes), (1, 6, 32));
        assert!(encode_get_log(ProtocolVersion::V1, &[0x77; 20]).is_err());

        let leaf = leaf_record(0, 0, 1);
        let bytes =
            encode_log_replay(ProtocolVersion::V1, &[0x77; 32], &[0x44; 32], &leaf).unwrap();
        assert_eq!(header(&bytes), (1, 7, (32 + 56 + 32) as u16));
        assert_eq!(&bytes[4..36], &[0x77; 32][..]);
        assert_eq!(&bytes[36..92], leaf.as_slice());
    }
}
