//! # debedup — frequency-aware deduplicating backup storage engine
//!
//! Two-tier dedup index (in-memory Count-Min sketch + Top-K heap backed by
//! a persistent outer index) on the write path; a recipe-driven restore
//! pipeline with a bounded container read-cache on the read path. Chunks
//! are compressed, AES-256-GCM encrypted, and packed into fixed-size
//! append-only containers; the outer index and recipes are themselves
//! encrypted so the storage server never sees plaintext fingerprints.
//!
//! Four pluggable index strategies share one [`dedup::DedupIndex`] trait:
//! the primary `OutOfEnclaveIndex` (sketch + heap + outer index) plus
//! `InEnclaveIndex`, `ExtremeBinIndex`, and `SparseIndex`, selected at
//! server startup (spec §6 `-m` flag).

pub mod error;
pub mod types;
pub mod crypto;
pub mod codec;
pub mod container;
pub mod cache;
pub mod sketch;
pub mod heap;
pub mod kv_store;
pub mod outer_index;
pub mod dedup;
pub mod recipe;
pub mod restore;
pub mod chunker;
pub mod key_oracle;
pub mod attestation;
pub mod protocol;
pub mod session;
pub mod persistence;
pub mod recovery;
pub mod config;
pub mod cli;
pub mod server;
pub mod client;

pub use error::EngineError;
pub use types::{ChunkAddress, ChunkFlag, Fingerprint, RecipeHeader};
pub use container::{Container, ContainerPacker, ContainerStore, MAX_CONTAINER_SIZE};
pub use cache::ReadCache;
pub use sketch::CountMinSketch;
pub use heap::TopKHeap;
pub use kv_store::{InMemoryKvStore, KVStore, SledKvStore};
pub use outer_index::OuterIndex;
pub use dedup::{ChunkOutcome, DedupError, DedupIndex, ExtremeBinIndex, IncomingChunk, InEnclaveIndex, OutOfEnclaveIndex, SparseIndex, WriteContext};
pub use recipe::{RecipeReader, RecipeWriter};
pub use restore::{RestoreEngine, RestoredChunk, CONTAINER_CAPPING_VALUE};
pub use chunker::{Chunker, FastCdcChunker, FixedSizeChunker, TraceReplayChunker};
pub use key_oracle::{KeyOracle, LocalKeyOracle};
pub use attestation::{Attestor, NullAttestor};
pub use protocol::{EcdhHandshake, Frame, MessageType, NetworkHeader, TcpTransport, Transport, MAX_SGX_MESSAGE_SIZE};
pub use session::{ClientSession, SessionMode, SessionState, TenantLease, TenantLockTable};
pub use config::Config;
