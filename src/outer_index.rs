//! Persistent, searchable outer index: fingerprint -> chunk address (spec
//! §4, §9).
//!
//! Grounded on `ecallFreqIndex.cc`'s sealed on-disk index (fingerprint keyed
//! lookup surviving enclave restarts), adapted from a sealed flat file to a
//! `KVStore`-backed map. Keys and values are passed through the deterministic
//! AES-CMC transform (spec §3/§9) before reaching the backend, so the
//! backend never observes plaintext fingerprints or addresses — only that
//! two encrypted keys are equal when their plaintexts were equal, which is
//! exactly what a probe needs.

use std::sync::Arc;

use crate::crypto;
use crate::error::IndexError;
use crate::kv_store::KVStore;
use crate::types::{ChunkAddress, Fingerprint};

pub struct OuterIndex {
    backend: Arc<dyn KVStore>,
    index_key: [u8; 32],
}

impl OuterIndex {
    pub fn new(backend: Arc<dyn KVStore>, index_key: [u8; 32]) -> Self {
        OuterIndex { backend, index_key }
    }

    fn encrypted_key(&self, fp: &Fingerprint) -> Vec<u8> {
        crypto::cmc_encrypt(&self.index_key, &fp.0)
    }

    /// Third-level lookup after the local batch map and the Top-K heap miss
    /// (spec §4.5 Phase B).
    pub fn lookup(&self, fp: &Fingerprint) -> Result<Option<ChunkAddress>, IndexError> {
        let key = self.encrypted_key(fp);
        match self.backend.get(&key)? {
            Some(encrypted_value) => {
                let plain = crypto::cmc_decrypt(&self.index_key, &encrypted_value);
                let buf: [u8; 16] = plain
                    .try_into()
                    .map_err(|_| IndexError::Serde("outer index value is not 16 bytes".into()))?;
                Ok(Some(ChunkAddress::from_bytes(&buf)))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a fingerprint's address (spec §4.5 Phase E: every
    /// chunk flagged Unique or Duplicate is (re)recorded in the outer index).
    pub fn insert(&self, fp: &Fingerprint, address: ChunkAddress) -> Result<(), IndexError> {
        let key = self.encrypted_key(fp);
        let value = crypto::cmc_encrypt(&self.index_key, &address.to_bytes());
        self.backend.put(&key, &value)
    }

    pub fn contains(&self, fp: &Fingerprint) -> Result<bool, IndexError> {
        self.backend.contains(&self.encrypted_key(fp))
    }

    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;

    #[test]
    fn round_trips_through_cmc() {
        let index = OuterIndex::new(Arc::new(InMemoryKvStore::new()), [5u8; 32]);
        let fp = Fingerprint::of(b"chunk");
        let addr = ChunkAddress { container_id: 7, offset: 11, length: 22 };

        assert!(!index.contains(&fp).unwrap());
        index.insert(&fp, addr).unwrap();
        assert!(index.contains(&fp).unwrap());
        assert_eq!(index.lookup(&fp).unwrap(), Some(addr));
    }

    #[test]
    fn equal_fingerprints_map_to_equal_encrypted_keys() {
        // Directly observable property of CMC: the backend sees identical
        // ciphertext for the same fingerprint inserted under two indices
        // sharing a key, which is what makes cross-session lookups of
        // previously-seen chunks possible.
        let backend = Arc::new(InMemoryKvStore::new());
        let key = [9u8; 32];
        let index_a = OuterIndex::new(backend.clone(), key);
        let index_b = OuterIndex::new(backend, key);
        let fp = Fingerprint::of(b"shared");
        let addr = ChunkAddress { container_id: 1, offset: 0, length: 4 };
        index_a.insert(&fp, addr).unwrap();
        assert_eq!(index_b.lookup(&fp).unwrap(), Some(addr));
    }
}
