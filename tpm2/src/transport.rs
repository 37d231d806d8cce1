// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Command framing over an abstract transport
//!
//! The library never opens a device itself. Callers provide a [`Transport`]
//! that moves one serialized command to the TPM and returns its response.

use anyhow::{anyhow, bail, Result};
use zeroize::Zeroizing;

use super::constants::*;
use super::marshal::*;

/// Size of a TPM command header: tag (2) + size (4) + command code (4)
pub const TPM_COMMAND_HEADER_SIZE: usize = 10;

/// Size of a TPM response header: tag (2) + size (4) + response code (4)
pub const TPM_RESPONSE_HEADER_SIZE: usize = 10;

/// One synchronous command exchange with the TPM
pub trait Transport {
    /// Send a serialized command and block until the response arrives
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Send a command and parse the response header
    ///
    /// The raw response is wiped once parsed.
    fn execute(&mut self, command: &[u8]) -> Result<TpmResponse> {
        let response_bytes = Zeroizing::new(self.transmit(command)?);
        TpmResponse::parse(&response_bytes)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        (**self).transmit(command)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        (**self).transmit(command)
    }
}

/// TPM command builder
pub struct TpmCommand {
    buf: CommandBuffer,
}

impl TpmCommand {
    /// Create a new command without sessions
    pub fn new(command_code: TpmCc) -> Self {
        Self::with_capacity(command_code, 256)
    }

    fn with_capacity(command_code: TpmCc, capacity: usize) -> Self {
        let mut buf = CommandBuffer::with_capacity(capacity);

        // Header: tag (2) + size (4) + command code (4)
        buf.put_u16(TpmSt::NoSessions.to_u16());
        buf.put_u32(0); // Size placeholder
        buf.put_u32(command_code.to_u32());

        Self { buf }
    }

    /// Create a Cr50 vendor command for the given subcommand
    ///
    /// The buffer is sized for exactly `payload_size` bytes of payload so that
    /// adding it never reallocates.
    pub fn vendor(subcommand: u16, payload_size: usize) -> Self {
        let capacity = TPM_COMMAND_HEADER_SIZE + 2 + payload_size;
        let mut cmd = Self::with_capacity(TpmCc::Cr50Vendor, capacity);
        cmd.add_u16(subcommand);
        cmd
    }

    /// Add a handle to the command
    pub fn add_handle(&mut self, handle: u32) {
        self.buf.put_u32(handle);
    }

    /// Add raw bytes to the command
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.buf.put_bytes(data);
    }

    pub fn add_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn add_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Add a TPM2B structure
    pub fn add_tpm2b(&mut self, data: &[u8]) {
        self.buf.put_tpm2b(data);
    }

    /// Add a marshallable structure
    pub fn add<T: Marshal>(&mut self, value: &T) {
        value.marshal(&mut self.buf);
    }

    /// Finalize the command and return the bytes
    pub fn finalize(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf.update_u32(2, size);
        self.buf.into_vec()
    }
}

/// TPM response parser
#[derive(Debug)]
pub struct TpmResponse {
    pub tag: TpmSt,
    pub response_code: u32,
    /// Parameter area, wiped on drop
    pub data: Zeroizing<Vec<u8>>,
}

impl TpmResponse {
    /// Parse a TPM response
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < TPM_RESPONSE_HEADER_SIZE {
            bail!("TPM response too short: {} bytes", response.len());
        }

        let mut buf = ResponseBuffer::new(response);

        let tag_raw = buf.get_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| anyhow!("invalid response tag: 0x{:04x}", tag_raw))?;

        let size = buf.get_u32()? as usize;
        if size != response.len() {
            bail!(
                "TPM response size mismatch: header says {}, got {}",
                size,
                response.len()
            );
        }

        let response_code = buf.get_u32()?;

        Ok(Self {
            tag,
            response_code,
            data: Zeroizing::new(buf.get_remaining()),
        })
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.response_code == 0
    }

    /// Ensure the response is successful
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            bail!("TPM error: 0x{:08x}", self.response_code)
        }
    }

    /// Get a response buffer for parsing the data
    pub fn data_buffer(&self) -> ResponseBuffer<'_> {
        ResponseBuffer::new(&self.data)
    }

    /// Strip the vendor subcommand echo and return the payload
    ///
    /// Vendor responses must carry `TPM_ST_NO_SESSIONS` and echo the
    /// subcommand that was sent. The response code is not inspected here.
    pub fn into_vendor_payload(self, subcommand: u16) -> Result<Zeroizing<Vec<u8>>> {
        if self.tag != TpmSt::NoSessions {
            bail!("bad vendor response tag: {:?}", self.tag);
        }
        let mut buf = self.data_buffer();
        let echoed = buf.get_u16()?;
        if echoed != subcommand {
            bail!(
                "vendor response for subcommand {} while {} was sent",
                echoed,
                subcommand
            );
        }
        Ok(Zeroizing::new(buf.get_remaining()))
    }
}
