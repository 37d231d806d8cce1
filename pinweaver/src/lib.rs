// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! PinWeaver credential protocol for Cr50
//!
//! PinWeaver keeps low-entropy secrets (PINs) in a Merkle tree whose root
//! lives in firmware. The firmware enforces a delay schedule on failed
//! attempts and releases the high-entropy secret only on a correct guess.
//!
//! This crate encodes requests, decodes responses and carries them inside Cr50
//! vendor commands. Codec functions are pure; [`PinWeaverClient`] adds the
//! transport.
//!
//! ## Example
//!
//! ```no_run
//! use hwsec_pinweaver::{empty_tree_aux_path, PinWeaverClient};
//! use hwsec_tpm2::Transport;
//!
//! fn reset(tpm: impl Transport) -> anyhow::Result<()> {
//!     let mut client = PinWeaverClient::negotiate(tpm)?;
//!     let reset = client.reset_tree(2, 6)?;
//!     println!("{} root {:02x?}", reset.result_code, reset.root);
//!     let _h_aux = empty_tree_aux_path(2, 6)?;
//!     Ok(())
//! }
//! ```

mod client;
mod constants;
mod error;
mod leaf;
mod log;
mod request;
mod response;
mod tree;
mod version;

pub use client::PinWeaverClient;
pub use constants::*;
pub use error::{CodecError, PinWeaverError};
pub use leaf::{validate_cred_metadata, LeafData, LeafHeader};
pub use log::{decode_log, LogEntry, LogEntryDecoder, LogEntryKind, Timestamp};
pub use request::*;
pub use response::*;
pub use tree::{empty_tree_aux_path, Label};
pub use version::ProtocolVersion;
