//! Core wire/on-disk value types shared across the write and read paths.
//!
//! # RecipeEntry on-disk layout (16 bytes, little-endian)
//! ```text
//! Offset  Size  Field
//!    0      8   container_id
//!    8      4   offset
//!   12      4   length
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 32-byte SHA-256 digest of a chunk's plaintext; the chunk's identity for
/// dedup purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Fingerprint(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Split the digest into `depth` u32 "words" for sketch row hashing —
    /// row `j` reads 4 bytes starting at `j * 4 mod 32`, rotating through
    /// the digest so each row samples an independent slice.
    pub fn word(&self, row: usize) -> u32 {
        let start = (row * 4) % 28; // leaves room for a full 4-byte read
        u32::from_le_bytes(self.0[start..start + 4].try_into().unwrap())
    }
}

/// Self-locating address of a chunk inside a container: which container,
/// what byte range. `length` is the on-disk (compressed + encrypted) size;
/// the logical size is recovered by decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAddress {
    pub container_id: u64,
    pub offset: u32,
    pub length: u32,
}

pub const RECIPE_ENTRY_SIZE: usize = 16;

impl ChunkAddress {
    pub fn to_bytes(&self) -> [u8; RECIPE_ENTRY_SIZE] {
        let mut buf = [0u8; RECIPE_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.container_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECIPE_ENTRY_SIZE]) -> Self {
        ChunkAddress {
            container_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            offset: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            length: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// Header written at offset 0 of a finalized recipe file (spec `FileRecipeHead_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeHeader {
    pub file_size: u64,
    pub chunk_count: u64,
}

pub const RECIPE_HEADER_SIZE: usize = 16;

impl RecipeHeader {
    pub fn to_bytes(&self) -> [u8; RECIPE_HEADER_SIZE] {
        let mut buf = [0u8; RECIPE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.file_size.to_le_bytes());
        buf[8..16].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECIPE_HEADER_SIZE]) -> Self {
        RecipeHeader {
            file_size: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            chunk_count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        }
    }
}

/// Outcome of the three-level lookup in `DedupCore` phase B (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFlag {
    Unique,
    TmpUnique,
    Duplicate,
    TmpDuplicate,
}

impl ChunkFlag {
    /// Every flag except a bare local-batch hit carries an address that
    /// should feed heap promotion (spec §4.5 Phase D: "not purely local").
    pub fn participates_in_heap_maintenance(self) -> bool {
        matches!(self, ChunkFlag::Unique | ChunkFlag::Duplicate)
    }
}
