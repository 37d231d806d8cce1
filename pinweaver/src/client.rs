// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver over the Cr50 vendor command channel

use hwsec_tpm2::{cr50_subcmd, vendor_command, Transport};
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

use super::constants::*;
use super::error::{CodecError, PinWeaverError};
use super::request::*;
use super::response::*;
use super::tree::Label;
use super::version::ProtocolVersion;

type Result<T, E = PinWeaverError> = std::result::Result<T, E>;

/// Client for one PinWeaver-capable TPM
///
/// The protocol version is fixed at construction and passed to every
/// encoder and decoder.
pub struct PinWeaverClient<T: Transport> {
    transport: T,
    version: ProtocolVersion,
}

impl<T: Transport> PinWeaverClient<T> {
    /// Probe the firmware and settle on the highest common version
    pub fn negotiate(mut transport: T) -> Result<Self> {
        let firmware_max = match ping(&mut transport, PW_PROTOCOL_VERSION) {
            Ok(version) => version,
            // Version 0 firmware rejects requests that claim a newer version.
            // A reply from firmware newer than us is final.
            Err(PinWeaverError::Codec(CodecError::AbiMismatch { version, .. }))
                if version <= PW_PROTOCOL_VERSION =>
            {
                debug!("PinWeaver ping rejected, retrying with version 0");
                ping(&mut transport, 0)?
            }
            Err(err) => return Err(err),
        };
        let version = ProtocolVersion::new(firmware_max.min(PW_PROTOCOL_VERSION))?;
        debug!("PinWeaver protocol version: {}", version);
        Ok(Self { transport, version })
    }

    /// Use `version` without probing the firmware
    pub fn with_version(transport: T, version: ProtocolVersion) -> Self {
        Self { transport, version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Ask the firmware for its highest supported version
    pub fn ping(&mut self) -> Result<u8> {
        ping(&mut self.transport, self.version.get())
    }

    pub fn reset_tree(&mut self, bits_per_level: u8, height: u8) -> Result<ShortResponse> {
        let request = encode_reset_tree(self.version, bits_per_level, height)?;
        let response = exchange(&mut self.transport, MessageType::ResetTree, &request)?;
        decoded(MessageType::ResetTree, parse_reset_tree(&response))
    }

    pub fn insert_leaf(&mut self, leaf: &InsertLeafRequest<'_>) -> Result<InsertLeafResponse> {
        let request = Zeroizing::new(encode_insert_leaf(self.version, leaf)?);
        let response = exchange(&mut self.transport, MessageType::InsertLeaf, &request)?;
        decoded(MessageType::InsertLeaf, parse_insert_leaf(&response))
    }

    pub fn remove_leaf(
        &mut self,
        label: Label,
        h_aux: &[u8],
        mac: &[u8],
    ) -> Result<ShortResponse> {
        let request = encode_remove_leaf(self.version, label, h_aux, mac)?;
        let response = exchange(&mut self.transport, MessageType::RemoveLeaf, &request)?;
        decoded(MessageType::RemoveLeaf, parse_remove_leaf(&response))
    }

    pub fn try_auth(
        &mut self,
        le_secret: &[u8],
        h_aux: &[u8],
        cred_metadata: &[u8],
    ) -> Result<TryAuthResponse> {
        let request = Zeroizing::new(encode_try_auth(
            self.version,
            le_secret,
            h_aux,
            cred_metadata,
        )?);
        let response = exchange(&mut self.transport, MessageType::TryAuth, &request)?;
        decoded(MessageType::TryAuth, parse_try_auth(self.version, &response))
    }

    pub fn reset_auth(
        &mut self,
        reset_secret: &[u8],
        h_aux: &[u8],
        cred_metadata: &[u8],
    ) -> Result<ResetAuthResponse> {
        let request = Zeroizing::new(encode_reset_auth(
            self.version,
            reset_secret,
            h_aux,
            cred_metadata,
        )?);
        let response = exchange(&mut self.transport, MessageType::ResetAuth, &request)?;
        decoded(MessageType::ResetAuth, parse_reset_auth(&response))
    }

    /// Log entries recorded since `root`, newest first
    pub fn get_log(&mut self, root: &[u8]) -> Result<GetLogResponse> {
        let request = encode_get_log(self.version, root)?;
        let response = exchange(&mut self.transport, MessageType::GetLog, &request)?;
        decoded(MessageType::GetLog, parse_get_log(&response))
    }

    /// Rebuild the leaf state recorded at `log_root` from stale metadata
    pub fn log_replay(
        &mut self,
        log_root: &[u8],
        h_aux: &[u8],
        cred_metadata: &[u8],
    ) -> Result<LogReplayResponse> {
        let request = encode_log_replay(self.version, log_root, h_aux, cred_metadata)?;
        let response = exchange(&mut self.transport, MessageType::LogReplay, &request)?;
        decoded(MessageType::LogReplay, parse_log_replay(&response))
    }
}

fn ping<T: Transport + ?Sized>(transport: &mut T, requested: u8) -> Result<u8> {
    let response = exchange(transport, MessageType::Invalid, &encode_ping(requested))?;
    decoded(MessageType::Invalid, parse_pong(&response))
}

/// Wrap `request` in the vendor envelope and return the PinWeaver reply
///
/// The reply is wiped on drop since TryAuth and ResetAuth carry secrets.
fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    message_type: MessageType,
    request: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    debug!(
        "PinWeaver {:?}: {} byte request",
        message_type,
        request.len()
    );
    let response = vendor_command(transport, cr50_subcmd::PINWEAVER, request)
        .map_err(PinWeaverError::Transport)?;
    if !response.is_success() {
        warn!(
            "PinWeaver {:?}: command failed: 0x{:08x}",
            message_type, response.response_code
        );
        return Err(PinWeaverError::Tpm {
            code: response.response_code,
        });
    }
    response
        .into_vendor_payload(cr50_subcmd::PINWEAVER)
        .map_err(PinWeaverError::Transport)
}

fn decoded<R>(message_type: MessageType, result: Result<R, CodecError>) -> Result<R> {
    result.map_err(|err| {
        error!("PinWeaver {:?}: bad response: {}", message_type, err);
        PinWeaverError::Codec(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use hwsec_tpm2::{CommandBuffer, TpmSt, TPM_RESPONSE_HEADER_SIZE};
    use std::collections::VecDeque;

    /// Replies with canned PinWeaver payloads inside a vendor envelope
    #[derive(Default)]
    struct Firmware {
        requests: Vec<Vec<u8>>,
        replies: VecDeque<(u32, Vec<u8>)>,
    }

    impl Firmware {
        fn reply(&mut self, version: u8, code: ResultCode, data: &[u8]) {
            let mut pw = vec![version];
            pw.extend_from_slice(&(data.len() as u16).to_le_bytes());
            pw.extend_from_slice(&code.0.to_le_bytes());
            pw.extend_from_slice(&[0x4e; 32]);
            pw.extend_from_slice(data);
            self.replies.push_back((0, pw));
        }
    }

    impl Transport for Firmware {
        fn transmit(&mut self, command: &[u8]) -> anyhow::Result<Vec<u8>> {
            // tag, size, command code, subcommand
            self.requests.push(command[12..].to_vec());
            let Some((rc, payload)) = self.replies.pop_front() else {
                bail!("no reply queued");
            };
            let mut buf = CommandBuffer::new();
            buf.put_u16(TpmSt::NoSessions.to_u16());
            buf.put_u32((TPM_RESPONSE_HEADER_SIZE + 2 + payload.len()) as u32);
            buf.put_u32(rc);
            buf.put_u16(cr50_subcmd::PINWEAVER);
            buf.put_bytes(&payload);
            Ok(buf.into_vec())
        }
    }

    #[test]
    fn test_negotiate_current_firmware() {
        let mut fw = Firmware::default();
        fw.reply(1, ResultCode::TYPE_INVALID, &[]);
        let client = PinWeaverClient::negotiate(&mut fw).unwrap();
        assert_eq!(client.version(), ProtocolVersion::V1);
        assert_eq!(fw.requests, [vec![1, 0, 0, 0]]);
    }

    #[test]
    fn test_negotiate_falls_back_to_version_0() {
        let mut fw = Firmware::default();
        fw.reply(0, ResultCode::VERSION_MISMATCH, &[]);
        fw.reply(0, ResultCode::TYPE_INVALID, &[]);
        let client = PinWeaverClient::negotiate(&mut fw).unwrap();
        assert_eq!(client.version(), ProtocolVersion::V0);
        assert_eq!(fw.requests, [vec![1, 0, 0, 0], vec![0, 0, 0, 0]]);
    }

    #[test]
    fn test_negotiate_unsupported() {
        let mut fw = Firmware::default();
        fw.reply(0, ResultCode::VERSION_MISMATCH, &[]);
        fw.reply(0, ResultCode::VERSION_MISMATCH, &[]);
        assert!(matches!(
            PinWeaverClient::negotiate(&mut fw),
            Err(PinWeaverError::Codec(CodecError::AbiMismatch { .. }))
        ));
    }

    #[test]
    fn test_negotiate_newer_firmware_is_final() {
        let mut fw = Firmware::default();
        fw.reply(2, ResultCode::TYPE_INVALID, &[]);
        fw.reply(0, ResultCode::TYPE_INVALID, &[]);
        assert!(matches!(
            PinWeaverClient::negotiate(&mut fw),
            Err(PinWeaverError::Codec(CodecError::AbiMismatch { version: 2, max: 1 }))
        ));
        assert_eq!(fw.requests, [vec![1, 0, 0, 0]]);
    }

    #[test]
    fn test_tpm_error_is_not_decoded() {
        let mut fw = Firmware::default();
        fw.replies.push_back((0x0000_0100, vec![]));
        let mut client = PinWeaverClient::with_version(&mut fw, ProtocolVersion::V1);
        assert!(matches!(
            client.reset_tree(2, 6),
            Err(PinWeaverError::Tpm { code: 0x100 })
        ));
        assert!(matches!(
            client.reset_tree(2, 6),
            Err(PinWeaverError::Transport(_))
        ));
    }

    #[test]
    fn test_codec_errors_do_not_reach_the_tpm() {
        let mut fw = Firmware::default();
        let mut client = PinWeaverClient::with_version(&mut fw, ProtocolVersion::V1);
        assert!(matches!(
            client.try_auth(&[0; 31], &[], &[0; 56]),
            Err(PinWeaverError::Codec(CodecError::BadParameter("le_secret")))
        ));
        assert!(client.get_log(&[0; 4]).is_err());
        drop(client);
        assert!(fw.requests.is_empty());
    }

    #[test]
    fn test_result_codes_are_data() {
        let mut fw = Firmware::default();
        fw.reply(1, ResultCode::PATH_AUTH_FAILED, &[]);
        let mut client = PinWeaverClient::with_version(&mut fw, ProtocolVersion::V1);
        let response = client.remove_leaf(Label(3), &[], &[0; 32]).unwrap();
        assert_eq!(response.result_code, ResultCode::PATH_AUTH_FAILED);
        assert_eq!(response.root, [0x4e; 32]);
    }
}
