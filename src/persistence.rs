//! Sealed-state read/write (spec §4.9).
//!
//! Grounded on the teacher's JSON `FileIndex` sidecar files, switched to a
//! binary `bincode` framing here since the sealed blobs (keys, sketch
//! counters, heap contents) are not meant to be human-readable, unlike the
//! teacher's archive index — noted as a dependency addition in DESIGN.md.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The 64-byte blob sealed on shutdown: enclave data key + index-query key
/// (spec §4.9 "(a)").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SealedKeys {
    pub data_key: [u8; 32],
    pub index_query_key: [u8; 32],
}

/// Aggregate statistics sealed alongside the keys (spec §4.9 "(b)").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SealedStats {
    pub logical_chunk_num: u64,
    pub logical_data_size: u64,
    pub unique_chunk_num: u64,
    pub unique_data_size: u64,
    pub compressed_data_size: u64,
}

/// Per-variant persisted index state (spec §4.9 "(c)"). Each variant seals
/// whatever it needs in its own format; this enum lets one sealed-file
/// reader dispatch to the right one without the caller needing to know the
/// active variant ahead of time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SealedIndexState {
    InEnclave(Vec<(crate::types::Fingerprint, crate::types::ChunkAddress)>),
    Freq { sketch_rows: Vec<Vec<u32>>, heap_entries: Vec<(crate::types::Fingerprint, u32, crate::types::ChunkAddress)> },
    ExtremeBin(Vec<(crate::types::Fingerprint, Vec<(crate::types::Fingerprint, crate::types::ChunkAddress)>)>),
    Sparse { hooks: Vec<(crate::types::Fingerprint, Vec<u64>)>, manifests: Vec<(u64, Vec<(crate::types::Fingerprint, crate::types::ChunkAddress)>)> },
}

pub fn seal_keys<P: AsRef<Path>>(path: P, keys: &SealedKeys) -> Result<(), ConfigError> {
    let bytes = bincode::serialize(keys).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Absence of a sealed file is not an error (spec §4.9: "a cold boot
/// re-randomizes keys").
pub fn unseal_keys<P: AsRef<Path>>(path: P) -> Result<Option<SealedKeys>, ConfigError> {
    match fs::read(path) {
        Ok(bytes) => {
            let keys = bincode::deserialize(&bytes).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Some(keys))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

pub fn seal_stats<P: AsRef<Path>>(path: P, stats: &SealedStats) -> Result<(), ConfigError> {
    let bytes = bincode::serialize(stats).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn unseal_stats<P: AsRef<Path>>(path: P) -> Result<Option<SealedStats>, ConfigError> {
    match fs::read(path) {
        Ok(bytes) => {
            let stats = bincode::deserialize(&bytes).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Some(stats))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// The recipe-file integrity hash lives beside the recipe, not in its
/// 16-byte on-disk header (spec `FileRecipeHead_t` has no room for it). A
/// raw 32-byte write, not bincode-framed, since there is only ever one
/// field.
pub fn seal_recipe_integrity<P: AsRef<Path>>(recipe_path: P, hash: [u8; 32]) -> Result<(), ConfigError> {
    fs::write(integrity_sidecar_path(recipe_path), hash)?;
    Ok(())
}

pub fn unseal_recipe_integrity<P: AsRef<Path>>(recipe_path: P) -> Result<Option<[u8; 32]>, ConfigError> {
    match fs::read(integrity_sidecar_path(recipe_path)) {
        Ok(bytes) => {
            let hash: [u8; 32] = bytes
                .try_into()
                .map_err(|_| ConfigError::Invalid("recipe integrity sidecar is not 32 bytes".into()))?;
            Ok(Some(hash))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

fn integrity_sidecar_path<P: AsRef<Path>>(recipe_path: P) -> std::path::PathBuf {
    let mut name = recipe_path.as_ref().as_os_str().to_owned();
    name.push(".integrity");
    std::path::PathBuf::from(name)
}

pub fn seal_index_state<P: AsRef<Path>>(path: P, state: &SealedIndexState) -> Result<(), ConfigError> {
    let bytes = bincode::serialize(state).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn unseal_index_state<P: AsRef<Path>>(path: P) -> Result<Option<SealedIndexState>, ConfigError> {
    match fs::read(path) {
        Ok(bytes) => {
            let state = bincode::deserialize(&bytes).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Some(state))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}
