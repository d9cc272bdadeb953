//! Deduplication index variants behind one trait (spec §4.5, §9).
//!
//! `DedupIndex` is the write-path's only entry point: given one batch of
//! plaintext chunks from a client, decide which are new and must be packed
//! into a container, and which already exist and can be referenced by
//! address alone. Four concrete strategies are grounded on the four enclave
//! index implementations in the original project; `OutOfEnclaveIndex` (the
//! sketch + Top-K heap + persistent outer index combination) is the primary
//! target spec.md describes in detail.

pub mod extreme_bin;
pub mod freq;
pub mod in_enclave;
pub mod sparse;

use crate::container::ContainerPacker;
use crate::crypto::IvCounter;
use crate::error::{IndexError, StoreError};
use crate::persistence::SealedIndexState;
use crate::types::{ChunkAddress, Fingerprint};

pub use freq::OutOfEnclaveIndex;
pub use in_enclave::InEnclaveIndex;
pub use extreme_bin::ExtremeBinIndex;
pub use sparse::SparseIndex;

/// One incoming chunk, still plaintext, as received from the client.
pub struct IncomingChunk {
    pub data: Vec<u8>,
}

/// Per-chunk outcome of a batch, in input order, used by `DedupCore` to
/// decide whether to store bytes or just reference an existing address.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutcome {
    pub fingerprint: Fingerprint,
    pub is_duplicate: bool,
    pub address: Option<ChunkAddress>,
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared write-path context every variant needs: where to put new chunk
/// bytes and how to encrypt them. Borrowed for the duration of one batch.
pub struct WriteContext<'a, 's> {
    pub packer: &'a mut ContainerPacker<'s>,
    pub data_key: &'a [u8; 32],
    pub iv_counter: &'a mut IvCounter,
}

/// Common interface for all dedup index strategies (spec §4.5, §9 redesign
/// note: "four variants behind one trait, selected by config").
pub trait DedupIndex {
    /// Process one batch of plaintext chunks: hash, classify as unique or
    /// duplicate, store unique bytes through `ctx`, and return one
    /// [`ChunkOutcome`] per input chunk in order.
    fn process_batch(
        &mut self,
        chunks: &[IncomingChunk],
        ctx: &mut WriteContext,
    ) -> Result<Vec<ChunkOutcome>, DedupError>;

    /// Flush whatever a variant buffers past batch boundaries (e.g. the
    /// `ExtremeBinIndex`'s current segment, `SparseIndex`'s open manifest).
    /// Called once at end of session (spec §4.5 "process the tailed batch").
    fn process_tail(&mut self, ctx: &mut WriteContext) -> Result<Vec<ChunkOutcome>, DedupError>;

    /// Snapshot this variant's in-memory state for sealing on shutdown
    /// (spec §4.9 "(c)"). `OutOfEnclaveIndex`'s outer index is durable on
    /// its own (sled-backed), so only its sketch and heap are snapshotted.
    fn seal_state(&self) -> SealedIndexState;
}
