//! Pluggable key-value backend for the persistent outer index (spec §4, §9).
//!
//! The spec deliberately leaves the outer index's storage backend as an
//! external collaborator. Grounded on the teacher's trait-object plugin
//! style (`plugin::PluginCodec`) for the trait shape, and on the pack's use
//! of `sled` as the corpus-idiomatic embedded KV store for the concrete
//! implementation.

use crate::error::IndexError;

/// Durable byte-oriented key-value storage. The outer index stores
/// CMC-encrypted fingerprints as keys and CMC-encrypted `ChunkAddress`
/// encodings as values, so this trait never needs to know about either.
pub trait KVStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexError>;
    fn remove(&self, key: &[u8]) -> Result<(), IndexError>;
    fn contains(&self, key: &[u8]) -> Result<bool, IndexError> {
        Ok(self.get(key)?.is_some())
    }
    /// Flush any buffered writes to durable storage.
    fn flush(&self) -> Result<(), IndexError>;
}

/// `sled`-backed persistent store — the default outer-index backend.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, IndexError> {
        let db = sled::open(path).map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(SledKvStore { db })
    }
}

impl KVStore for SledKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        self.db
            .get(key)
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| IndexError::Backend(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexError> {
        self.db
            .insert(key, value)
            .map(|_| ())
            .map_err(|e| IndexError::Backend(e.to_string()))
    }

    fn remove(&self, key: &[u8]) -> Result<(), IndexError> {
        self.db
            .remove(key)
            .map(|_| ())
            .map_err(|e| IndexError::Backend(e.to_string()))
    }

    fn flush(&self) -> Result<(), IndexError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| IndexError::Backend(e.to_string()))
    }
}

/// In-memory backend for tests and the `InEnclaveIndex` variant, which
/// keeps its whole outer index resident (spec §4 dedup index variants).
#[derive(Default)]
pub struct InMemoryKvStore {
    map: parking_lot::RwLock<std::collections::HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        InMemoryKvStore::default()
    }
}

impl KVStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexError> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<(), IndexError> {
        self.map.write().remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let store = InMemoryKvStore::new();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.contains(b"k").unwrap());
        store.remove(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn sled_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store.put(b"fp", b"addr").unwrap();
        assert_eq!(store.get(b"fp").unwrap(), Some(b"addr".to_vec()));
        store.flush().unwrap();
    }
}
