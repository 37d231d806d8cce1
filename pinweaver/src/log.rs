// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! GetLog record decoding
//!
//! Each record is 73 bytes:
//!
//! ```text
//! type u8 | label u64 | root[32] | mac[32]                                   (InsertLeaf)
//!                                | boot_count u32 | timer u64 | rc u32 | pad  (TryAuth)
//! ```

use hwsec_tpm2::ResponseBuffer;

use super::constants::*;
use super::error::{CodecError, Result};
use super::tree::Label;

/// Firmware time of an authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub boot_count: u32,
    pub timer_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntryKind {
    InsertLeaf { mac: [u8; PW_HASH_SIZE] },
    RemoveLeaf,
    Auth {
        timestamp: Timestamp,
        return_code: ResultCode,
    },
    ResetTree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub label: Label,
    /// Root after the logged operation
    pub root: RootHash,
    pub kind: LogEntryKind,
}

/// Iterator over the records of a GetLog payload, newest first
#[derive(Debug)]
pub struct LogEntryDecoder<'a> {
    buf: ResponseBuffer<'a>,
}

impl<'a> LogEntryDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() % PW_LOG_ENTRY_SIZE != 0 {
            return Err(CodecError::BadSize {
                expected: (data.len() / PW_LOG_ENTRY_SIZE + 1) * PW_LOG_ENTRY_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            buf: ResponseBuffer::new(data),
        })
    }

    fn decode_one(&mut self) -> Result<LogEntry> {
        let entry_type = self.buf.get_u8()?;
        let label = Label(self.buf.get_u64_le()?);
        let root = self.buf.get_array()?;
        let mut union = ResponseBuffer::new(self.buf.take(32)?);

        let kind = match MessageType::from_u8(entry_type) {
            Some(MessageType::InsertLeaf) => LogEntryKind::InsertLeaf {
                mac: union.get_array()?,
            },
            Some(MessageType::RemoveLeaf) => LogEntryKind::RemoveLeaf,
            Some(MessageType::TryAuth) => LogEntryKind::Auth {
                timestamp: Timestamp {
                    boot_count: union.get_u32_le()?,
                    timer_value: union.get_u64_le()?,
                },
                return_code: ResultCode(union.get_u32_le()?),
            },
            Some(MessageType::ResetTree) => LogEntryKind::ResetTree,
            _ => return Err(CodecError::BadSequence(entry_type)),
        };
        Ok(LogEntry { label, root, kind })
    }
}

impl Iterator for LogEntryDecoder<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.remaining() == 0 {
            return None;
        }
        Some(self.decode_one())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.buf.remaining() / PW_LOG_ENTRY_SIZE;
        (n, Some(n))
    }
}

/// Decode a whole GetLog payload; any unknown record type fails the lot
pub fn decode_log(data: &[u8]) -> Result<Vec<LogEntry>> {
    LogEntryDecoder::new(data)?.collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(entry_type: u8, label: u64, root: u8, union: &[u8]) -> Vec<u8> {
        let mut out = vec![entry_type];
        out.extend_from_slice(&label.to_le_bytes());
        out.extend_from_slice(&[root; 32]);
        out.extend_from_slice(union);
        out.resize(PW_LOG_ENTRY_SIZE, 0);
        out
    }

    fn auth_union(boot_count: u32, timer: u64, rc: ResultCode) -> Vec<u8> {
        let mut out = boot_count.to_le_bytes().to_vec();
        out.extend_from_slice(&timer.to_le_bytes());
        out.extend_from_slice(&rc.0.to_le_bytes());
        out
    }

    #[test]
    fn test_single_insert_leaf_entry() {
        let data = record(2, 0x1b1, 0xa1, &[0xcc; 32]);
        let entries = decode_log(&data).unwrap();
        assert_eq!(
            entries,
            [LogEntry {
                label: Label(0x1b1),
                root: [0xa1; 32],
                kind: LogEntryKind::InsertLeaf { mac: [0xcc; 32] },
            }]
        );
    }

    #[test]
    fn test_mixed_log() {
        let auth = auth_union(7, 0x1234_5678_9abc, ResultCode::LOWENT_AUTH_FAILED);
        let mut data = record(4, 9, 3, &auth);
        data.extend(record(3, 9, 2, &[0xff; 32]));
        data.extend(record(1, 0, 1, &[]));

        let decoder = LogEntryDecoder::new(&data).unwrap();
        assert_eq!(decoder.size_hint(), (3, Some(3)));
        let entries: Vec<_> = decoder.collect::<Result<_>>().unwrap();
        assert_eq!(
            entries[0].kind,
            LogEntryKind::Auth {
                timestamp: Timestamp {
                    boot_count: 7,
                    timer_value: 0x1234_5678_9abc,
                },
                return_code: ResultCode::LOWENT_AUTH_FAILED,
            }
        );
        assert_eq!(entries[1].kind, LogEntryKind::RemoveLeaf);
        assert_eq!(entries[2].kind, LogEntryKind::ResetTree);
        assert!(decode_log(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_type_is_bad_sequence() {
        let mut data = record(2, 1, 1, &[]);
        data.extend(record(9, 1, 1, &[]));
        assert_eq!(decode_log(&data), Err(CodecError::BadSequence(9)));
        assert_eq!(
            decode_log(&record(0, 1, 1, &[])),
            Err(CodecError::BadSequence(0))
        );
    }

    #[test]
    fn test_length_must_be_whole_records() {
        let mut data = record(2, 1, 1, &[]);
        data.push(0);
        assert_eq!(
            decode_log(&data),
            Err(CodecError::BadSize {
                expected: 146,
                actual: 74
            })
        );
    }
}
