// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command helpers used by session management and vendor clients

use anyhow::{Context, Result};
use tracing::debug;
use zeroize::Zeroizing;

use super::constants::*;
use super::marshal::*;
use super::transport::*;
use super::types::*;

/// Read the public area of a loaded or persistent object
///
/// `TPM2_ReadPublic` needs no authorization, so the result is only as
/// trustworthy as the channel it came over.
pub fn read_public<T: Transport + ?Sized>(transport: &mut T, handle: u32) -> Result<Tpm2bPublic> {
    let mut cmd = TpmCommand::new(TpmCc::ReadPublic);
    cmd.add_handle(handle);

    let response = transport.execute(&cmd.finalize())?;
    response
        .ensure_success()
        .with_context(|| format!("ReadPublic failed for handle 0x{:08x}", handle))?;

    let mut buf = response.data_buffer();
    let out_public = Tpm2bPublic::unmarshal(&mut buf)?;
    let _name = buf.get_tpm2b()?;
    let _qualified_name = buf.get_tpm2b()?;

    debug!(
        "read public area of 0x{:08x} ({} bytes)",
        handle,
        out_public.public_area.len()
    );
    Ok(out_public)
}

/// Flush (close) a transient object or session handle
pub fn flush_context<T: Transport + ?Sized>(transport: &mut T, handle: u32) -> Result<()> {
    let mut cmd = TpmCommand::new(TpmCc::FlushContext);
    cmd.add_handle(handle);

    let response = transport.execute(&cmd.finalize())?;
    response
        .ensure_success()
        .with_context(|| format!("FlushContext failed for handle 0x{:08x}", handle))?;

    Ok(())
}

/// Send a Cr50 vendor subcommand and return the raw response
///
/// The response code is left for the caller: vendor clients report a
/// non-zero code as a TPM-level failure distinct from malformed framing.
/// `payload` may carry secrets, so the serialized command is wiped after
/// it is sent.
pub fn vendor_command<T: Transport + ?Sized>(
    transport: &mut T,
    subcommand: u16,
    payload: &[u8],
) -> Result<TpmResponse> {
    let mut cmd = TpmCommand::vendor(subcommand, payload.len());
    cmd.add_bytes(payload);
    let cmd_bytes = Zeroizing::new(cmd.finalize());
    debug!(
        "vendor subcommand {}: {} byte command",
        subcommand,
        cmd_bytes.len()
    );
    transport
        .execute(&cmd_bytes)
        .with_context(|| format!("vendor subcommand {} failed", subcommand))
}
