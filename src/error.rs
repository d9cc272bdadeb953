//! Error taxonomy for the dedup engine.
//!
//! Each module owns a narrow error enum; [`EngineError`] composes them for
//! callers that cross module boundaries (the session loop, the CLI). The
//! taxonomy mirrors the kinds a backup server must distinguish at runtime:
//! a closed peer is not a bug, a bad auth tag is fatal to the session, a
//! disk failure is fatal and must not finalize a recipe (see `I1`).

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: authentication tag mismatch")]
    AuthError,
    #[error("encrypted payload too short")]
    TooShort,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("container {0:016x} not found")]
    ContainerNotFound(u64),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("outer index backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unexpected message type {got:?} in state {state}")]
    UnexpectedMessage { got: u32, state: &'static str },
    #[error("frame payload size {0} exceeds MAX_SGX_MESSAGE_SIZE")]
    PayloadTooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("tenant {0} session lock is held by another connection")]
    ConcurrencyError(u32),
    #[error("peer closed the connection")]
    TransportClosed,
}

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("recipe references unknown container {0:016x}")]
    UnknownContainer(u64),
    #[error("container read out of bounds: offset {offset} len {len} container size {size}")]
    OutOfBounds { offset: u32, len: u32, size: u32 },
    #[error("chunk authentication failed")]
    AuthFailed,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("recipe batch size {recipe} must be a multiple of chunk batch size {chunk}")]
    BatchSizeMismatch { recipe: usize, chunk: usize },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error joining every module's taxonomy; used at session and CLI
/// boundaries where errors from several subsystems can surface together.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dedup(#[from] crate::dedup::DedupError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
