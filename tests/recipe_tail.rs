//! Seed scenario 6 (spec.md §8): uploading a chunk count that doesn't
//! divide evenly into the client's send-batch size leaves a short final
//! batch. The recipe header must still report the true totals, and restore
//! must still deliver every chunk in order.

use debedup::{
    ChunkAddress, ContainerPacker, ContainerStore, DedupIndex, IncomingChunk, InEnclaveIndex,
    ReadCache, RecipeReader, RecipeWriter, RestoreEngine, WriteContext,
};

#[test]
fn a_short_tail_batch_still_yields_a_correct_header() {
    let dir = tempfile::tempdir().unwrap();
    let container_root = dir.path().join("containers");
    let recipe_path = dir.path().join("file-recipe");
    let master_key = [13u8; 32];

    let store = ContainerStore::new(&container_root).unwrap();
    let mut packer = ContainerPacker::new(&store);
    let mut recipe_writer = RecipeWriter::create(&recipe_path, master_key).unwrap();
    let mut index = InEnclaveIndex::new();
    let mut iv_counter = debedup::crypto::IvCounter::new();

    // 7 distinct chunks sent in batches of 3, 3, 1 — the send batch size
    // does not evenly divide the chunk count, leaving a tail of one.
    let payloads: Vec<Vec<u8>> = (0u8..7).map(|i| vec![i; 32]).collect();
    let send_batches: [&[Vec<u8>]; 3] = [&payloads[0..3], &payloads[3..6], &payloads[6..7]];

    for send_batch in send_batches {
        let chunks: Vec<IncomingChunk> = send_batch.iter().map(|p| IncomingChunk { data: p.clone() }).collect();
        let outcomes = {
            let mut ctx = WriteContext { packer: &mut packer, data_key: &master_key, iv_counter: &mut iv_counter };
            index.process_batch(&chunks, &mut ctx).unwrap()
        };
        let entries: Vec<ChunkAddress> = outcomes.iter().map(|o| o.address.unwrap()).collect();
        let total_bytes: u64 = send_batch.iter().map(|p| p.len() as u64).sum();
        recipe_writer.write_batch(&entries, total_bytes).unwrap();
    }

    packer.flush().unwrap();
    recipe_writer.finalize().unwrap();

    let expected_file_size: u64 = payloads.iter().map(|p| p.len() as u64).sum();
    let mut reader = RecipeReader::open(&recipe_path, master_key).unwrap();
    assert_eq!(reader.header.chunk_count, 7, "chunk_count must count every chunk, not just whole send-batches");
    assert_eq!(reader.header.file_size, expected_file_size);

    let mut cache = ReadCache::new(&store, 4);
    let mut restore_engine = RestoreEngine::new(&mut cache, master_key);

    let mut restored_payloads = Vec::new();
    while let Some(recipe_entries) = reader.next_batch().unwrap() {
        let restored = restore_engine.restore_batch(&recipe_entries).unwrap();
        restored_payloads.extend(restored.into_iter().map(|c| c.plain));
    }

    assert_eq!(restored_payloads, payloads);
}
