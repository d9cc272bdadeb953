//! Seed scenario 4 (spec.md §8): feeding enough distinct max-size chunks to
//! overflow a container forces a rollover. The new container's first chunk
//! lands at offset zero, the recipe entries are partitioned across both
//! container ids, and restore reassembles the file in order regardless of
//! the container boundary.

use debedup::container::IV_LEN;
use debedup::{
    ChunkAddress, ContainerPacker, ContainerStore, DedupIndex, IncomingChunk, InEnclaveIndex,
    ReadCache, RecipeReader, RecipeWriter, RestoreEngine, WriteContext, MAX_CONTAINER_SIZE,
};

/// Pseudo-random, non-repeating fill so LZ4 always declines and the cipher
/// length stays `plain.len() + 1 (tag) + 16 (GCM tag)` (same technique as
/// `codec::tests::round_trip_incompressible`, seeded per chunk so the four
/// chunks are distinct).
fn incompressible_chunk(seed: u32, len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| ((i.wrapping_mul(2654435761) ^ seed) >> 24) as u8).collect()
}

#[test]
fn a_container_rolls_over_once_four_max_size_chunks_overflow_it() {
    let dir = tempfile::tempdir().unwrap();
    let container_root = dir.path().join("containers");
    let recipe_path = dir.path().join("file-recipe");
    let master_key = [21u8; 32];

    let store = ContainerStore::new(&container_root).unwrap();
    let mut packer = ContainerPacker::new(&store);
    let mut recipe_writer = RecipeWriter::create(&recipe_path, master_key).unwrap();
    let mut index = InEnclaveIndex::new();
    let mut iv_counter = debedup::crypto::IvCounter::new();

    // Sized so exactly 3 encoded chunks fit in one container; the 4th must
    // roll over into a fresh one.
    let codec_overhead: u32 = 1 + 16; // compression tag byte + GCM auth tag
    let per_chunk = (MAX_CONTAINER_SIZE / 3 - IV_LEN - codec_overhead) as usize;
    let payloads: Vec<Vec<u8>> = (0u32..4).map(|seed| incompressible_chunk(seed, per_chunk)).collect();

    let batch: Vec<IncomingChunk> = payloads.iter().map(|p| IncomingChunk { data: p.clone() }).collect();
    let outcomes = {
        let mut ctx = WriteContext { packer: &mut packer, data_key: &master_key, iv_counter: &mut iv_counter };
        index.process_batch(&batch, &mut ctx).unwrap()
    };
    assert!(outcomes.iter().all(|o| !o.is_duplicate), "all four chunks are distinct");

    let entries: Vec<ChunkAddress> = outcomes.iter().map(|o| o.address.unwrap()).collect();
    assert_eq!(entries[0].container_id, entries[1].container_id);
    assert_eq!(entries[1].container_id, entries[2].container_id);
    assert_ne!(entries[2].container_id, entries[3].container_id, "the 4th chunk must roll over");
    assert_eq!(entries[3].offset, 0, "the new container starts at offset 0");

    let total_bytes: u64 = payloads.iter().map(|p| p.len() as u64).sum();
    recipe_writer.write_batch(&entries, total_bytes).unwrap();
    packer.flush().unwrap();
    recipe_writer.finalize().unwrap();

    let mut reader = RecipeReader::open(&recipe_path, master_key).unwrap();
    assert_eq!(reader.header.chunk_count, 4);
    assert_eq!(reader.header.file_size, total_bytes);

    let mut cache = ReadCache::new(&store, 4);
    let mut restore_engine = RestoreEngine::new(&mut cache, master_key);
    let recipe_entries = reader.next_batch().unwrap().unwrap();
    let restored = restore_engine.restore_batch(&recipe_entries).unwrap();

    let restored_payloads: Vec<Vec<u8>> = restored.into_iter().map(|c| c.plain).collect();
    assert_eq!(restored_payloads, payloads);
}
