//! Key-issuance oracle collaborator (spec §1 Non-goals list, §9): blind-RSA
//! / DupLESS / TED schemes are out of scope, represented only as a trait
//! with one local default.

use sha2::{Digest, Sha256};

use crate::types::Fingerprint;

pub trait KeyOracle: Send + Sync {
    /// Derive (or fetch) the per-chunk key used for convergent encryption
    /// schemes layered on top of the base AES-256-GCM chunk cipher. The
    /// dedup engine itself only needs the file master key (§4.1); this
    /// trait exists so an external MLE key server can be swapped in without
    /// touching `ChunkCodec`.
    fn chunk_key(&self, fp: &Fingerprint) -> [u8; 32];
}

/// Derives the key locally from the fingerprint and a process secret —
/// used whenever no external key server is configured (spec §9 default).
pub struct LocalKeyOracle {
    process_secret: [u8; 32],
}

impl LocalKeyOracle {
    pub fn new(process_secret: [u8; 32]) -> Self {
        LocalKeyOracle { process_secret }
    }
}

impl KeyOracle for LocalKeyOracle {
    fn chunk_key(&self, fp: &Fingerprint) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.process_secret);
        hasher.update(fp.0);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fingerprint_yields_same_key() {
        let oracle = LocalKeyOracle::new([1u8; 32]);
        let fp = Fingerprint::of(b"chunk");
        assert_eq!(oracle.chunk_key(&fp), oracle.chunk_key(&fp));
    }

    #[test]
    fn different_fingerprints_yield_different_keys() {
        let oracle = LocalKeyOracle::new([1u8; 32]);
        let a = oracle.chunk_key(&Fingerprint::of(b"a"));
        let b = oracle.chunk_key(&Fingerprint::of(b"b"));
        assert_ne!(a, b);
    }
}
