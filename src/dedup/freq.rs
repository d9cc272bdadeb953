//! Out-of-enclave frequency index: Count-Min sketch + Top-K heap + a
//! persistent outer index (spec §4.5, primary implementation target).
//!
//! Grounded on `EcallFreqIndex::ProcessOneBatch`
//! (`ecallFreqIndex.cc`): per chunk, update the sketch and re-estimate
//! frequency, then resolve identity through three tiers in order —
//! (1) this batch's own local map, (2) the in-memory Top-K heap, (3) the
//! persistent outer index — falling through to "unique" only once all
//! three miss.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec;
use crate::dedup::{ChunkOutcome, DedupError, DedupIndex, IncomingChunk, WriteContext};
use crate::heap::TopKHeap;
use crate::kv_store::KVStore;
use crate::outer_index::OuterIndex;
use crate::persistence::SealedIndexState;
use crate::sketch::CountMinSketch;
use crate::types::Fingerprint;

pub struct OutOfEnclaveIndex {
    sketch: CountMinSketch,
    heap: TopKHeap,
    outer: OuterIndex,
}

impl OutOfEnclaveIndex {
    pub fn new(sketch: CountMinSketch, heap_capacity: usize, backend: Arc<dyn KVStore>, index_key: [u8; 32]) -> Self {
        OutOfEnclaveIndex {
            sketch,
            heap: TopKHeap::new(heap_capacity),
            outer: OuterIndex::new(backend, index_key),
        }
    }

    /// Restore the sketch and heap from a sealed snapshot (spec §4.9); the
    /// outer index is sled-backed and already durable across restarts on
    /// its own, so it is opened fresh rather than rebuilt from the seal.
    pub fn restore_state(&mut self, state: SealedIndexState) {
        if let SealedIndexState::Freq { sketch_rows, heap_entries } = state {
            self.sketch.load_rows(sketch_rows);
            self.heap.load_entries(heap_entries);
        }
    }
}

impl DedupIndex for OutOfEnclaveIndex {
    fn process_batch(
        &mut self,
        chunks: &[IncomingChunk],
        ctx: &mut WriteContext,
    ) -> Result<Vec<ChunkOutcome>, DedupError> {
        let mut local_batch_map: HashMap<Fingerprint, _> = HashMap::new();
        let mut outcomes = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let fp = codec::hash(&chunk.data);
            self.sketch.update(&fp, 1);
            let freq = self.sketch.estimate(&fp);

            // Phase B, tier 1: this batch's own local map.
            if let Some(&address) = local_batch_map.get(&fp) {
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            // Phase B, tier 2: the in-memory Top-K heap.
            if let Some((_, address)) = self.heap.get(&fp) {
                self.heap.update(&fp, freq, address);
                local_batch_map.insert(fp, address);
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            // Phase B, tier 3: the persistent outer index.
            if let Some(address) = self.outer.lookup(&fp)? {
                // Seen before but evicted from the heap; freq has since
                // grown, so it may now be worth re-promoting (spec §4.4).
                self.heap.add(fp, freq, address);
                local_batch_map.insert(fp, address);
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            // Phase C/D/E: genuinely new. Encode, pack, and record.
            let (cipher, iv) = codec::encode_chunk(&chunk.data, ctx.data_key, ctx.iv_counter)
                .map_err(|_| DedupError::Index(crate::error::IndexError::Backend("encryption failed".into())))?;
            let address = ctx.packer.save_chunk(&cipher, &iv)?;

            self.outer.insert(&fp, address)?;
            self.heap.add(fp, freq, address);
            local_batch_map.insert(fp, address);
            outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: false, address: Some(address) });
        }

        Ok(outcomes)
    }

    fn process_tail(&mut self, ctx: &mut WriteContext) -> Result<Vec<ChunkOutcome>, DedupError> {
        ctx.packer.flush()?;
        self.outer.flush()?;
        Ok(Vec::new())
    }

    fn seal_state(&self) -> SealedIndexState {
        SealedIndexState::Freq {
            sketch_rows: self.sketch.counter_rows().to_vec(),
            heap_entries: self.heap.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerStore;
    use crate::crypto::IvCounter;
    use crate::kv_store::InMemoryKvStore;

    fn chunk(bytes: &[u8]) -> IncomingChunk {
        IncomingChunk { data: bytes.to_vec() }
    }

    #[test]
    fn repeated_chunk_in_same_batch_is_flagged_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = crate::container::ContainerPacker::new(&store);
        let key = [1u8; 32];
        let mut iv_counter = IvCounter::new();
        let mut ctx = WriteContext { packer: &mut packer, data_key: &key, iv_counter: &mut iv_counter };

        let mut index = OutOfEnclaveIndex::new(
            CountMinSketch::new(4096, 4),
            4,
            Arc::new(InMemoryKvStore::new()),
            [2u8; 32],
        );

        let batch = vec![chunk(b"alpha"), chunk(b"beta"), chunk(b"alpha")];
        let outcomes = index.process_batch(&batch, &mut ctx).unwrap();

        assert!(!outcomes[0].is_duplicate);
        assert!(!outcomes[1].is_duplicate);
        assert!(outcomes[2].is_duplicate);
        assert_eq!(outcomes[0].address, outcomes[2].address);
    }

    #[test]
    fn chunk_reappearing_after_heap_eviction_is_found_via_outer_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = crate::container::ContainerPacker::new(&store);
        let key = [1u8; 32];
        let mut iv_counter = IvCounter::new();
        let mut ctx = WriteContext { packer: &mut packer, data_key: &key, iv_counter: &mut iv_counter };

        // Heap capacity 1 forces quick eviction.
        let mut index = OutOfEnclaveIndex::new(
            CountMinSketch::new(4096, 4),
            1,
            Arc::new(InMemoryKvStore::new()),
            [2u8; 32],
        );

        let batch1 = vec![chunk(b"first")];
        let o1 = index.process_batch(&batch1, &mut ctx).unwrap();
        assert!(!o1[0].is_duplicate);

        // Evict "first" out of the 1-slot heap.
        let batch2 = vec![chunk(b"second"), chunk(b"second"), chunk(b"second")];
        index.process_batch(&batch2, &mut ctx).unwrap();

        // "first" is no longer in the heap but must still resolve via the
        // outer index rather than being (incorrectly) re-stored as unique.
        let batch3 = vec![chunk(b"first")];
        let o3 = index.process_batch(&batch3, &mut ctx).unwrap();
        assert!(o3[0].is_duplicate);
        assert_eq!(o3[0].address, o1[0].address);
    }
}
