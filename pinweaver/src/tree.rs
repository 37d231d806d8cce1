// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Leaf labels and auxiliary paths of the PinWeaver Merkle tree

use std::fmt;

use sha2::{Digest, Sha256};

use super::constants::*;
use super::error::{CodecError, Result};

/// Position of a leaf in the tree
///
/// Each level consumes `bits_per_level` bits; the level nearest the root is
/// the most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u64);

fn check_shape(bits_per_level: u8, height: usize) -> Result<()> {
    if !(1..=8).contains(&bits_per_level) {
        return Err(CodecError::BadParameter("bits_per_level"));
    }
    if bits_per_level as usize * height > 64 {
        return Err(CodecError::BadParameter("height"));
    }
    Ok(())
}

impl Label {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Build a label from child indices, root level first
    pub fn from_path(bits_per_level: u8, path: &[u8]) -> Result<Self> {
        check_shape(bits_per_level, path.len())?;
        let fan_out = 1u16 << bits_per_level;
        let mut label = 0u64;
        for &index in path {
            if u16::from(index) >= fan_out {
                return Err(CodecError::BadParameter("path index"));
            }
            label = (label << bits_per_level) | u64::from(index);
        }
        Ok(Self(label))
    }

    /// Child indices from the root level down to the leaf
    pub fn path(self, bits_per_level: u8, height: u8) -> Result<Vec<u8>> {
        check_shape(bits_per_level, height as usize)?;
        let bits = bits_per_level as u32 * height as u32;
        if bits < 64 && self.0 >> bits != 0 {
            return Err(CodecError::BadParameter("label"));
        }
        let mask = (1u64 << bits_per_level) - 1;
        Ok((0..height as u32)
            .rev()
            .map(|level| ((self.0 >> (level * bits_per_level as u32)) & mask) as u8)
            .collect())
    }
}

impl From<u64> for Label {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Auxiliary path for any leaf of a tree in which every leaf is empty
///
/// Levels are emitted leaf first. An empty leaf hashes to all zeros and each
/// parent is `SHA256` over its `2^bits_per_level` children.
pub fn empty_tree_aux_path(bits_per_level: u8, height: u8) -> Result<Vec<u8>> {
    check_shape(bits_per_level, height as usize)?;
    let fan_out = 1usize << bits_per_level;
    let siblings = fan_out - 1;
    let size = height as usize * siblings * PW_HASH_SIZE;
    if size > PW_MAX_PATH_SIZE {
        return Err(CodecError::BadParameter("h_aux"));
    }

    let mut h_aux = Vec::with_capacity(size);
    let mut level_hash = [0u8; PW_HASH_SIZE];
    for _ in 0..height {
        for _ in 0..siblings {
            h_aux.extend_from_slice(&level_hash);
        }
        let mut hasher = Sha256::new();
        for _ in 0..fan_out {
            hasher.update(level_hash);
        }
        level_hash = hasher.finalize().into();
    }
    Ok(h_aux)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_path() {
        let label = Label::from_path(2, &[0, 1, 2, 3, 0, 1]).unwrap();
        assert_eq!(label, Label(0x1b1));
        assert_eq!(label.path(2, 6).unwrap(), [0, 1, 2, 3, 0, 1]);
        assert_eq!(label.to_string(), "0x1b1");

        assert!(Label::from_path(2, &[4]).is_err());
        assert!(Label(0x1000).path(2, 6).is_err());
        assert!(Label(0).path(9, 1).is_err());
        assert_eq!(Label(u64::MAX).path(8, 8).unwrap(), [0xff; 8]);
    }

    #[test]
    fn test_empty_tree_aux_path() {
        let h_aux = empty_tree_aux_path(2, 6).unwrap();
        assert_eq!(h_aux.len(), 6 * 3 * 32);

        // First level: three empty leaves
        assert!(h_aux[..96].iter().all(|&b| b == 0));

        // Second level: hash of four empty leaves
        let parent: [u8; 32] = Sha256::digest([0u8; 128]).into();
        assert_eq!(&h_aux[96..128], &parent);
        assert_eq!(&h_aux[160..192], &parent);
        assert_ne!(&h_aux[192..224], &parent);

        assert_eq!(
            empty_tree_aux_path(4, 3),
            Err(CodecError::BadParameter("h_aux"))
        );
    }
}
