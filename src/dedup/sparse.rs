//! Sparse Indexing: a small sample of "hook" fingerprints per segment
//! selects a champion manifest to compare against (spec §4.5, grounded on
//! `EcallSparseIndex` / `ecallSparse.cc`).
//!
//! A chunk fingerprint is a hook of its segment when its first byte is
//! zero, giving roughly a 1/256 sampling rate — a direct analogue of the
//! original's low-order-bits sampling predicate, chosen over a rolling
//! min-hash since the spec leaves the exact sampling rule unspecified.

use std::collections::HashMap;

use crate::codec;
use crate::dedup::{ChunkOutcome, DedupError, DedupIndex, IncomingChunk, WriteContext};
use crate::persistence::SealedIndexState;
use crate::types::{ChunkAddress, Fingerprint};

type ManifestId = u64;

pub struct SparseIndex {
    hook_index: HashMap<Fingerprint, Vec<ManifestId>>,
    manifests: HashMap<ManifestId, HashMap<Fingerprint, ChunkAddress>>,
    next_manifest_id: ManifestId,
}

impl SparseIndex {
    pub fn new() -> Self {
        SparseIndex {
            hook_index: HashMap::new(),
            manifests: HashMap::new(),
            next_manifest_id: 0,
        }
    }

    fn is_hook(fp: &Fingerprint) -> bool {
        fp.0[0] == 0
    }

    /// Among manifests referenced by this segment's hooks, the one that
    /// shares the most hooks with the segment wins (spec: "FindChampionSegment").
    fn champion(&self, hooks: &[Fingerprint]) -> Option<ManifestId> {
        let mut overlap: HashMap<ManifestId, usize> = HashMap::new();
        for hook in hooks {
            if let Some(manifest_ids) = self.hook_index.get(hook) {
                for &id in manifest_ids {
                    *overlap.entry(id).or_insert(0) += 1;
                }
            }
        }
        overlap.into_iter().max_by_key(|&(_, count)| count).map(|(id, _)| id)
    }

    /// Rebuild from a sealed snapshot (spec §4.9). Hooks are re-derived from
    /// each manifest rather than trusted from the sealed hook list, so that
    /// `next_manifest_id` and `hook_index` stay mutually consistent.
    pub fn from_sealed(_hooks: Vec<(Fingerprint, Vec<ManifestId>)>, manifests: Vec<(ManifestId, Vec<(Fingerprint, ChunkAddress)>)>) -> Self {
        let mut index = SparseIndex::new();
        for (id, entries) in manifests {
            let dedup_map: HashMap<Fingerprint, ChunkAddress> = entries.into_iter().collect();
            for &fp in dedup_map.keys() {
                if Self::is_hook(&fp) {
                    index.hook_index.entry(fp).or_default().push(id);
                }
            }
            index.manifests.insert(id, dedup_map);
            index.next_manifest_id = index.next_manifest_id.max(id + 1);
        }
        index
    }
}

impl Default for SparseIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupIndex for SparseIndex {
    fn process_batch(
        &mut self,
        chunks: &[IncomingChunk],
        ctx: &mut WriteContext,
    ) -> Result<Vec<ChunkOutcome>, DedupError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let fingerprints: Vec<Fingerprint> = chunks.iter().map(|c| codec::hash(&c.data)).collect();
        let hooks: Vec<Fingerprint> = fingerprints.iter().copied().filter(Self::is_hook).collect();

        let champion = self.champion(&hooks);
        let mut dedup_map = champion
            .and_then(|id| self.manifests.get(&id).cloned())
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(chunks.len());
        for (chunk, &fp) in chunks.iter().zip(&fingerprints) {
            if let Some(&address) = dedup_map.get(&fp) {
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            let (cipher, iv) = codec::encode_chunk(&chunk.data, ctx.data_key, ctx.iv_counter)
                .map_err(|_| DedupError::Index(crate::error::IndexError::Backend("encryption failed".into())))?;
            let address = ctx.packer.save_chunk(&cipher, &iv)?;
            dedup_map.insert(fp, address);
            outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: false, address: Some(address) });
        }

        let manifest_id = self.next_manifest_id;
        self.next_manifest_id += 1;
        for hook in &hooks {
            self.hook_index.entry(*hook).or_default().push(manifest_id);
        }
        self.manifests.insert(manifest_id, dedup_map);

        Ok(outcomes)
    }

    fn process_tail(&mut self, ctx: &mut WriteContext) -> Result<Vec<ChunkOutcome>, DedupError> {
        ctx.packer.flush()?;
        Ok(Vec::new())
    }

    fn seal_state(&self) -> SealedIndexState {
        SealedIndexState::Sparse {
            hooks: self.hook_index.iter().map(|(&fp, ids)| (fp, ids.clone())).collect(),
            manifests: self
                .manifests
                .iter()
                .map(|(&id, map)| (id, map.iter().map(|(&fp, &addr)| (fp, addr)).collect()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerPacker, ContainerStore};
    use crate::crypto::IvCounter;

    #[test]
    fn repeated_segment_dedups_via_champion_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = ContainerPacker::new(&store);
        let key = [8u8; 32];
        let mut iv_counter = IvCounter::new();
        let mut ctx = WriteContext { packer: &mut packer, data_key: &key, iv_counter: &mut iv_counter };

        let mut index = SparseIndex::new();
        let segment: Vec<IncomingChunk> = (0u8..40).map(|i| IncomingChunk { data: vec![i; 16] }).collect();
        let first = index.process_batch(&segment, &mut ctx).unwrap();
        assert!(first.iter().all(|o| !o.is_duplicate));

        let replay: Vec<IncomingChunk> = (0u8..40).map(|i| IncomingChunk { data: vec![i; 16] }).collect();
        let second = index.process_batch(&replay, &mut ctx).unwrap();
        assert!(second.iter().all(|o| o.is_duplicate));
    }
}
