//! RestoreEngine — recipe-driven read path (spec §4.7).
//!
//! Grounded on the teacher's `SixCyReader::unpack_file` (sequential block
//! read + decompress + verify) generalized to the recipe's batched,
//! capped container-fetch scheme: instead of one self-contained archive
//! file, a restore streams entries that may reference any of the engine's
//! containers, so container ids are deduplicated into a dense per-batch
//! array before any disk I/O, bounding how many containers one batch can
//! touch at once (`CONTAINER_CAPPING_VALUE`, spec §4.7/§9).

use crate::cache::ReadCache;
use crate::codec;
use crate::error::RestoreError;
use crate::recipe::RecipeReader;
use crate::types::ChunkAddress;

/// Matches `original_source/Prototype/script/default/constVar.h`.
pub const CONTAINER_CAPPING_VALUE: usize = 16;

/// One decoded chunk ready to be framed and sent to the client.
pub struct RestoredChunk {
    pub plain: Vec<u8>,
}

pub struct RestoreEngine<'c> {
    cache: &'c mut ReadCache<'c>,
    data_key: [u8; 32],
}

impl<'c> RestoreEngine<'c> {
    pub fn new(cache: &'c mut ReadCache<'c>, data_key: [u8; 32]) -> Self {
        RestoreEngine { cache, data_key }
    }

    /// Decode one batch of recipe entries already read from a
    /// [`RecipeReader`], honoring the `CONTAINER_CAPPING_VALUE` dense-index
    /// rewrite and ordered delivery (spec §4.7 algorithm steps 2-5).
    pub fn restore_batch(&mut self, entries: &[ChunkAddress]) -> Result<Vec<RestoredChunk>, RestoreError> {
        // Step 2-3: dedup container ids into a dense local id map, capped.
        let mut local_ids: Vec<u64> = Vec::new();
        for e in entries {
            if !local_ids.contains(&e.container_id) {
                local_ids.push(e.container_id);
            }
        }
        if local_ids.len() > CONTAINER_CAPPING_VALUE {
            // The caller is expected to have already split the batch so
            // this never happens in normal operation (spec §4.7 step 4).
            return Err(RestoreError::OutOfBounds { offset: 0, len: 0, size: local_ids.len() as u32 });
        }

        // Step 4: populate the dense container array via the read cache.
        let mut containers: Vec<&[u8]> = Vec::with_capacity(local_ids.len());
        for &id in &local_ids {
            let body = self
                .cache
                .get(id)
                .map_err(|_| RestoreError::UnknownContainer(id))?;
            containers.push(body);
        }

        // Step 5: decode each entry in order.
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let dense = local_ids.iter().position(|&id| id == e.container_id).unwrap();
            let body = containers[dense];

            let iv_start = e.offset as usize + e.length as usize;
            let iv_end = iv_start + 16;
            if iv_end > body.len() {
                return Err(RestoreError::OutOfBounds {
                    offset: e.offset,
                    len: e.length,
                    size: body.len() as u32,
                });
            }

            let cipher = &body[e.offset as usize..e.offset as usize + e.length as usize];
            let iv: [u8; 16] = body[iv_start..iv_end].try_into().unwrap();

            let plain = codec::decode_chunk(cipher, &self.data_key, &iv)
                .map_err(|_| RestoreError::AuthFailed)?;
            out.push(RestoredChunk { plain });
        }

        Ok(out)
    }

    /// Drive a whole recipe to completion, batch by batch, calling `sink`
    /// for every decoded batch in order (spec §4.7 "ordering guarantee").
    pub fn restore_all<F>(&mut self, reader: &mut RecipeReader, mut sink: F) -> Result<(), RestoreError>
    where
        F: FnMut(Vec<RestoredChunk>) -> Result<(), RestoreError>,
    {
        while let Some(entries) = reader.next_batch().map_err(|_| RestoreError::AuthFailed)? {
            for chunk in entries.chunks(CONTAINER_CAPPING_VALUE) {
                let restored = self.restore_batch(chunk)?;
                sink(restored)?;
            }
        }
        Ok(())
    }
}
