//! Fully in-memory dedup index: no frequency tiering, no persistent outer
//! tier, just one flat map (spec §4.5, grounded on `EcallInEnclaveIndex` /
//! `ecallInEnclave.cc` — the project's "baseline" full-enclave index, kept
//! entirely resident rather than split into hot/cold tiers).

use std::collections::HashMap;

use crate::codec;
use crate::dedup::{ChunkOutcome, DedupError, DedupIndex, IncomingChunk, WriteContext};
use crate::persistence::SealedIndexState;
use crate::types::{ChunkAddress, Fingerprint};

#[derive(Default)]
pub struct InEnclaveIndex {
    map: HashMap<Fingerprint, ChunkAddress>,
}

impl InEnclaveIndex {
    pub fn new() -> Self {
        InEnclaveIndex::default()
    }

    /// Rebuild from a sealed snapshot (spec §4.9: "on boot these are read
    /// back; absence is not an error").
    pub fn from_sealed(entries: Vec<(Fingerprint, ChunkAddress)>) -> Self {
        InEnclaveIndex { map: entries.into_iter().collect() }
    }
}

impl DedupIndex for InEnclaveIndex {
    fn process_batch(
        &mut self,
        chunks: &[IncomingChunk],
        ctx: &mut WriteContext,
    ) -> Result<Vec<ChunkOutcome>, DedupError> {
        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let fp = codec::hash(&chunk.data);
            if let Some(&address) = self.map.get(&fp) {
                outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: true, address: Some(address) });
                continue;
            }

            let (cipher, iv) = codec::encode_chunk(&chunk.data, ctx.data_key, ctx.iv_counter)
                .map_err(|_| DedupError::Index(crate::error::IndexError::Backend("encryption failed".into())))?;
            let address = ctx.packer.save_chunk(&cipher, &iv)?;
            self.map.insert(fp, address);
            outcomes.push(ChunkOutcome { fingerprint: fp, is_duplicate: false, address: Some(address) });
        }
        Ok(outcomes)
    }

    fn process_tail(&mut self, ctx: &mut WriteContext) -> Result<Vec<ChunkOutcome>, DedupError> {
        ctx.packer.flush()?;
        Ok(Vec::new())
    }

    fn seal_state(&self) -> SealedIndexState {
        SealedIndexState::InEnclave(self.map.iter().map(|(&fp, &addr)| (fp, addr)).collect())
    }
}
