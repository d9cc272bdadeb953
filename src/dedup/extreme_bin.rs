//! Extreme Binning: one representative fingerprint per segment selects a
//! "bin" of chunk fingerprints to compare against (spec §4.5, grounded on
//! `EcallExtremeBinIndex` / `ecallExtreme.cc`).
//!
//! Each `process_batch` call is treated as one segment (the wire protocol
//! already groups chunks into batches, so no separate segmentation step is
//! needed here). The segment's representative is its lexicographically
//! smallest chunk fingerprint — a stand-in for the original's min-hash
//! selection, resolving the Open Question in spec.md §9 in favor of
//! "segment-hash" rather than a second sampling pass.

use std::collections::HashMap;

use crate::codec;
use crate::dedup::{ChunkOutcome, DedupError, DedupIndex, IncomingChunk, WriteContext};
use crate::persistence::SealedIndexState;
use crate::types::{ChunkAddress, Fingerprint};

/// Maps a segment's representative fingerprint to the bin of chunk
/// fingerprint/address pairs last seen under it (spec §9 "primary index").
pub struct ExtremeBinIndex {
    primary: HashMap<Fingerprint, HashMap<Fingerprint, ChunkAddress>>,
}

impl ExtremeBinIndex {
    pub fn new() -> Self {
        ExtremeBinIndex { primary: HashMap::new() }
    }

    fn representative(fps: &[Fingerprint]) -> Fingerprint {
        *fps.iter().min().expect("segment must be non-empty")
    }

    /// Rebuild from a sealed snapshot (spec §4.9).
    pub fn from_sealed(bins: Vec<(Fingerprint, Vec<(Fingerprint, ChunkAddress)>)>) -> Self {
        ExtremeBinIndex {
            primary: bins.into_iter().map(|(rep, bin)| (rep, bin.into_iter().collect())).collect(),
        }
    }
}

impl Default for ExtremeBinIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupIndex for ExtremeBinIndex {
    fn process_batch(
        &mut self,
        chunks: &[IncomingChunk],
        ctx: &mut WriteContext,
    ) -> Result<Vec<ChunkOutcome>, DedupError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let fingerprints: Vec<Fingerprint> = chunks.iter().map(|c| codec::hash(&c.data)).collect();
        let representative = Self::representative(&fingerprints);

        let mut bin = self.primary.remove(&representative).unwrap_or_default();
        let mut outcomes = Vec::with_capacity(chunks.len());

        for (chunk, &fp) in chunks.iter().zip(&fingerprints) {
            if let Some(&address) = bin.get(&fp) {
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            let (cipher, iv) = codec::encode_chunk(&chunk.data, ctx.data_key, ctx.iv_counter)
                .map_err(|_| DedupError::Index(crate::error::IndexError::Backend("encryption failed".into())))?;
            let address = ctx.packer.save_chunk(&cipher, &iv)?;
            bin.insert(fp, address);
            outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: false, address: Some(address) });
        }

        self.primary.insert(representative, bin);
        Ok(outcomes)
    }

    fn process_tail(&mut self, ctx: &mut WriteContext) -> Result<Vec<ChunkOutcome>, DedupError> {
        ctx.packer.flush()?;
        Ok(Vec::new())
    }

    fn seal_state(&self) -> SealedIndexState {
        SealedIndexState::ExtremeBin(
            self.primary
                .iter()
                .map(|(&rep, bin)| (rep, bin.iter().map(|(&fp, &addr)| (fp, addr)).collect()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerPacker, ContainerStore};
    use crate::crypto::IvCounter;

    #[test]
    fn identical_segment_replayed_is_fully_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = ContainerPacker::new(&store);
        let key = [6u8; 32];
        let mut iv_counter = IvCounter::new();
        let mut ctx = WriteContext { packer: &mut packer, data_key: &key, iv_counter: &mut iv_counter };

        let mut index = ExtremeBinIndex::new();
        let segment = vec![
            IncomingChunk { data: b"a".to_vec() },
            IncomingChunk { data: b"b".to_vec() },
            IncomingChunk { data: b"c".to_vec() },
        ];
        let first = index.process_batch(&segment, &mut ctx).unwrap();
        assert!(first.iter().all(|o| !o.is_duplicate));

        let replay = vec![
            IncomingChunk { data: b"a".to_vec() },
            IncomingChunk { data: b"b".to_vec() },
            IncomingChunk { data: b"c".to_vec() },
        ];
        let second = index.process_batch(&replay, &mut ctx).unwrap();
        assert!(second.iter().all(|o| o.is_duplicate));
    }
}
