//! TCP server: accepts connections and drives one session loop per
//! connection (spec §4.8, §4.10, §5, §6).
//!
//! Grounded on the teacher's `archive::Archive` ("owns everything it
//! touches, nothing is shared across instances") for session ownership,
//! generalized to the spec's "one OS thread per connection" concurrency
//! model (spec §5).

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::attestation::{Attestor, NullAttestor};
use crate::cache::ReadCache;
use crate::config::Config;
use crate::container::{ContainerPacker, ContainerStore};
use crate::crypto::{self, IvCounter};
use crate::dedup::{ChunkOutcome, DedupIndex, ExtremeBinIndex, IncomingChunk, InEnclaveIndex, OutOfEnclaveIndex, SparseIndex, WriteContext};
use crate::error::{ConfigError, EngineError, ProtocolError};
use crate::kv_store::SledKvStore;
use crate::persistence::{self, SealedIndexState, SealedKeys, SealedStats};
use crate::protocol::{EcdhHandshake, Frame, MessageType, NetworkHeader, TcpTransport, Transport};
use crate::recipe::{RecipeReader, RecipeWriter};
use crate::restore::{RestoreEngine, CONTAINER_CAPPING_VALUE};
use crate::session::{ClientSession, SessionMode, SessionState, TenantLockTable};
use crate::sketch::CountMinSketch;
use crate::types::ChunkAddress;

fn build_index(mode: u8, config: &Config, index_key: [u8; 32], sealed_state: Option<SealedIndexState>) -> Result<Box<dyn DedupIndex + Send>, EngineError> {
    match mode {
        1 => Ok(Box::new(match sealed_state {
            Some(SealedIndexState::InEnclave(entries)) => InEnclaveIndex::from_sealed(entries),
            _ => InEnclaveIndex::new(),
        })),
        2 => Ok(Box::new(match sealed_state {
            Some(SealedIndexState::ExtremeBin(bins)) => ExtremeBinIndex::from_sealed(bins),
            _ => ExtremeBinIndex::new(),
        })),
        3 => Ok(Box::new(match sealed_state {
            Some(SealedIndexState::Sparse { hooks, manifests }) => SparseIndex::from_sealed(hooks, manifests),
            _ => SparseIndex::new(),
        })),
        // Modes 0 ("out-enclave") and 4 ("freq") differ in the original
        // system only by which side of the SGX enclave boundary the
        // sketch lives on; this crate models no enclave boundary, so both
        // resolve to the same sketch+heap+outer-index combination.
        0 | 4 => {
            let db_path = PathBuf::from(&config.storage.container_root_path).join(&config.storage.fp2chunk_db_name);
            let backend = Arc::new(SledKvStore::open(db_path).map_err(EngineError::Index)?);
            let heap_capacity = (config.freq_index.top_k_param as usize).saturating_mul(1000);
            let mut index = OutOfEnclaveIndex::new(CountMinSketch::default(), heap_capacity, backend, index_key);
            if let Some(state @ SealedIndexState::Freq { .. }) = sealed_state {
                index.restore_state(state);
            }
            Ok(Box::new(index))
        }
        other => Err(EngineError::Config(ConfigError::Invalid(format!("unknown index mode {other}")))),
    }
}

struct ServerState {
    container_store: ContainerStore,
    dedup_index: Mutex<Box<dyn DedupIndex + Send>>,
    tenant_locks: TenantLockTable,
    recipe_root: PathBuf,
    read_cache_size: usize,
    attestor: Box<dyn Attestor + Send + Sync>,
    stats: Mutex<SealedStats>,
    keys_path: PathBuf,
    stats_path: PathBuf,
    index_state_path: PathBuf,
}

pub fn run(config: Config, index_mode: u8) -> Result<(), EngineError> {
    let container_store = ContainerStore::new(&config.storage.container_root_path)?;
    std::fs::create_dir_all(&config.storage.recipe_root_path)?;

    let persistence_root = PathBuf::from(&config.storage.container_root_path);
    let keys_path = persistence_root.join("sealed.keys");
    let stats_path = persistence_root.join("sealed.stats");
    let index_state_path = persistence_root.join("sealed.index");

    let sealed_keys = persistence::unseal_keys(&keys_path).map_err(EngineError::Config)?;
    let index_key = match &sealed_keys {
        Some(keys) => keys.index_query_key,
        None => {
            let fresh = SealedKeys {
                data_key: crypto::derive_master_key(config.crypto.local_secret.as_bytes()),
                index_query_key: crypto::derive_master_key(format!("{}-outer-index", config.crypto.local_secret).as_bytes()),
            };
            persistence::seal_keys(&keys_path, &fresh).map_err(EngineError::Config)?;
            fresh.index_query_key
        }
    };
    let sealed_state = persistence::unseal_index_state(&index_state_path).map_err(EngineError::Config)?;
    let stats = persistence::unseal_stats(&stats_path).map_err(EngineError::Config)?.unwrap_or_default();

    let state = Arc::new(ServerState {
        container_store,
        dedup_index: Mutex::new(build_index(index_mode, &config, index_key, sealed_state)?),
        tenant_locks: TenantLockTable::new(),
        recipe_root: PathBuf::from(&config.storage.recipe_root_path),
        read_cache_size: config.restore.read_cache_size.max(1),
        attestor: Box::new(NullAttestor),
        stats: Mutex::new(stats),
        keys_path,
        stats_path,
        index_state_path,
    });

    let addr = format!("{}:{}", config.transport.storage_server_ip, config.transport.storage_server_port);
    let listener = TcpListener::bind(&addr)?;
    log::info!("debedup server listening on {addr} (index mode {index_mode})");

    for incoming in listener.incoming() {
        let stream = incoming?;
        let state = Arc::clone(&state);
        thread::spawn(move || {
            let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
            if let Err(e) = handle_connection(stream, &state) {
                log::warn!("session with {peer} ended: {e}");
            }
            seal_current_state(&state);
        });
    }
    Ok(())
}

/// Reseal index state and aggregate stats after every session (spec §4.9:
/// sealing happens "on shutdown"; this crate has no graceful-shutdown
/// signal handler, so each connection's end stands in for one).
fn seal_current_state(state: &ServerState) {
    let snapshot = state.dedup_index.lock().seal_state();
    if let Err(e) = persistence::seal_index_state(&state.index_state_path, &snapshot) {
        log::warn!("failed to seal index state: {e}");
    }
    let stats_snapshot = state.stats.lock().clone();
    if let Err(e) = persistence::seal_stats(&state.stats_path, &stats_snapshot) {
        log::warn!("failed to seal stats: {e}");
    }
}

fn recipe_path(state: &ServerState, file_name_hash: &[u8; 32]) -> PathBuf {
    state.recipe_root.join(format!("{}-recipe", hex::encode(file_name_hash)))
}

fn expect(got: &Frame, want: MessageType) -> Result<(), EngineError> {
    if MessageType::from_u32(got.header.message_type) != Some(want) {
        return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage {
            got: got.header.message_type,
            state: "server-session",
        }));
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, state: &ServerState) -> Result<(), EngineError> {
    let mut transport = TcpTransport::new(stream);

    // Attestation-Decision (spec §4.8): branch into ATTEST or SKIP before
    // the ECDH handshake, per the client's own `AttestationConfig` presence.
    let decision = transport.recv_frame()?;
    match MessageType::from_u32(decision.header.message_type) {
        Some(MessageType::SgxRaNeed) => state.attestor.attest()?,
        Some(MessageType::SgxRaNotNeed) => {}
        other => {
            return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage {
                got: other.map(|m| m as u32).unwrap_or(decision.header.message_type),
                state: "AttestationDecision",
            }));
        }
    }

    let server_handshake = EcdhHandshake::new();
    let init = transport.recv_frame()?;
    expect(&init, MessageType::SessionKeyInit)?;
    let peer_point = p256::EncodedPoint::from_bytes(&init.payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let session_key = server_handshake.derive_session_key(&peer_point)?;
    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: MessageType::SessionKeyReply as u32, client_id: 0, data_size: 0, current_item_num: 0 },
        payload: server_handshake.public_point().as_bytes().to_vec(),
    })?;

    let login = transport.recv_frame()?;
    let mode = match MessageType::from_u32(login.header.message_type) {
        Some(MessageType::ClientLoginUpload) => SessionMode::Upload,
        Some(MessageType::ClientLoginDownload) => SessionMode::Download,
        _ => return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage { got: login.header.message_type, state: "Login" })),
    };
    if login.payload.len() != 64 {
        return Err(EngineError::Protocol(ProtocolError::Malformed("login payload must be 64 bytes".into())));
    }
    let file_name_hash: [u8; 32] = login.payload[0..32].try_into().unwrap();
    let master_key: [u8; 32] = crypto::session_xor(&session_key, &login.payload[32..64]).try_into().unwrap();
    let client_id = login.header.client_id;

    let _lease = match state.tenant_locks.try_acquire(client_id) {
        Ok(lease) => lease,
        Err(e) => {
            log::info!("{e}; blocking until the holder releases it");
            state.tenant_locks.acquire(client_id)
        }
    };
    let mut session = ClientSession::new(client_id, master_key, session_key);
    session.state = SessionState::Active(mode);

    match mode {
        SessionMode::Upload => run_upload(state, &mut transport, &mut session, file_name_hash),
        SessionMode::Download => run_download(state, &mut transport, &session, file_name_hash),
    }
}

/// Upload sessions split network I/O from container/recipe writing across
/// two threads joined by a bounded channel (spec §5): this thread decrypts
/// and frames incoming batches off the wire as fast as the client sends
/// them, while a scoped `DataWriter` thread drains the channel and owns the
/// container packer, recipe writer, and dedup index lock. A full channel
/// applies backpressure to the network read without blocking it on disk I/O.
fn run_upload(state: &ServerState, transport: &mut TcpTransport, session: &mut ClientSession, file_name_hash: [u8; 32]) -> Result<(), EngineError> {
    let packer = ContainerPacker::new(&state.container_store);
    let recipe_writer = RecipeWriter::create(recipe_path(state, &file_name_hash), session.master_key)?;
    let master_key = session.master_key;
    let (tx, rx) = crossbeam_channel::bounded::<Vec<Vec<u8>>>(32);

    thread::scope(|scope| {
        let writer = scope.spawn(move || data_writer_loop(state, rx, packer, recipe_writer, master_key));

        let net_result: Result<(), EngineError> = (|| loop {
            let frame = transport.recv_frame()?;
            match MessageType::from_u32(frame.header.message_type) {
                Some(MessageType::ClientUploadChunk) => {
                    if frame.payload.len() < 16 {
                        return Err(EngineError::Protocol(ProtocolError::Malformed("chunk batch payload too short".into())));
                    }
                    let (iv_bytes, cipher) = frame.payload.split_at(16);
                    let iv: [u8; 16] = iv_bytes.try_into().unwrap();
                    let plain = crypto::decrypt_128(&session.session_key, &iv, cipher)?;
                    let chunks = parse_length_prefixed(&plain)?;
                    if tx.send(chunks).is_err() {
                        // DataWriter thread already exited (its own error
                        // will surface from the join below).
                        return Ok(());
                    }
                }
                Some(MessageType::ClientUploadRecipeEnd) => return Ok(()),
                other => {
                    return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage {
                        got: other.map(|m| m as u32).unwrap_or(frame.header.message_type),
                        state: "Upload",
                    }));
                }
            }
        })();

        drop(tx);
        let writer_result = writer.join().unwrap_or_else(|_| {
            Err(EngineError::Protocol(ProtocolError::Malformed("data writer thread panicked".into())))
        });
        net_result.and(writer_result)
    })
}

/// Runs on the `DataWriter` thread: drains decoded chunk batches until the
/// sender side closes (the network thread saw `ClientUploadRecipeEnd`), then
/// flushes the tail and finalizes the recipe.
fn data_writer_loop(
    state: &ServerState,
    rx: crossbeam_channel::Receiver<Vec<Vec<u8>>>,
    mut packer: ContainerPacker<'_>,
    mut recipe_writer: RecipeWriter,
    master_key: [u8; 32],
) -> Result<(), EngineError> {
    let mut iv_counter = IvCounter::new();
    let mut pending_entries: Vec<ChunkAddress> = Vec::new();
    let mut pending_bytes: u64 = 0;
    let mut session_stats = SealedStats::default();

    for chunks in rx {
        let outcomes: Vec<ChunkOutcome> = {
            let mut index = state.dedup_index.lock();
            let incoming: Vec<IncomingChunk> = chunks.iter().map(|c| IncomingChunk { data: c.clone() }).collect();
            let mut ctx = WriteContext { packer: &mut packer, data_key: &master_key, iv_counter: &mut iv_counter };
            index.process_batch(&incoming, &mut ctx)?
        };

        for (chunk, outcome) in chunks.iter().zip(&outcomes) {
            session_stats.logical_chunk_num += 1;
            session_stats.logical_data_size += chunk.len() as u64;
            if let Some(addr) = outcome.address {
                pending_entries.push(addr);
                pending_bytes += chunk.len() as u64;
                if !outcome.is_duplicate {
                    session_stats.unique_chunk_num += 1;
                    session_stats.unique_data_size += chunk.len() as u64;
                    session_stats.compressed_data_size += addr.length as u64;
                }
            }
        }
    }

    if !pending_entries.is_empty() {
        recipe_writer.write_batch(&pending_entries, pending_bytes)?;
    }
    {
        let mut index = state.dedup_index.lock();
        let mut ctx = WriteContext { packer: &mut packer, data_key: &master_key, iv_counter: &mut iv_counter };
        // Every DedupIndex variant's process_tail only flushes buffered
        // container bytes; none currently hold chunks past a batch
        // boundary, so no outcomes are returned here.
        index.process_tail(&mut ctx)?;
    }
    packer.flush()?;
    recipe_writer.finalize()?;

    let mut stats = state.stats.lock();
    stats.logical_chunk_num += session_stats.logical_chunk_num;
    stats.logical_data_size += session_stats.logical_data_size;
    stats.unique_chunk_num += session_stats.unique_chunk_num;
    stats.unique_data_size += session_stats.unique_data_size;
    stats.compressed_data_size += session_stats.compressed_data_size;
    drop(stats);

    Ok(())
}

fn run_download(state: &ServerState, transport: &mut TcpTransport, session: &ClientSession, file_name_hash: [u8; 32]) -> Result<(), EngineError> {
    let ready = transport.recv_frame()?;
    expect(&ready, MessageType::ClientRestoreReady)?;

    let path = recipe_path(state, &file_name_hash);
    let mut reader = match RecipeReader::open(&path, session.master_key) {
        Ok(r) => r,
        Err(_) => {
            transport.send_frame(&Frame {
                header: NetworkHeader { message_type: MessageType::ServerFileNonExist as u32, client_id: session.client_id, data_size: 0, current_item_num: 0 },
                payload: Vec::new(),
            })?;
            return Ok(());
        }
    };

    let mut cache = ReadCache::new(&state.container_store, state.read_cache_size);
    let mut restore_engine = RestoreEngine::new(&mut cache, session.master_key);
    let mut iv_counter = IvCounter::new();

    while let Some(entries) = reader.next_batch()? {
        for group in entries.chunks(CONTAINER_CAPPING_VALUE) {
            let restored = restore_engine.restore_batch(group)?;

            let mut plain = Vec::new();
            for chunk in &restored {
                plain.extend_from_slice(&(chunk.plain.len() as u32).to_le_bytes());
                plain.extend_from_slice(&chunk.plain);
            }
            let iv = iv_counter.advance();
            let cipher = crypto::encrypt_128(&session.session_key, &iv, &plain)?;
            let mut payload = Vec::with_capacity(16 + cipher.len());
            payload.extend_from_slice(&iv);
            payload.extend_from_slice(&cipher);

            transport.send_frame(&Frame {
                header: NetworkHeader {
                    message_type: MessageType::ServerRestoreChunk as u32,
                    client_id: session.client_id,
                    data_size: payload.len() as u32,
                    current_item_num: restored.len() as u32,
                },
                payload,
            })?;
        }
    }

    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: MessageType::ServerRestoreFinal as u32, client_id: session.client_id, data_size: 0, current_item_num: 0 },
        payload: Vec::new(),
    })?;
    Ok(())
}

/// Parse `(u32 length, bytes[length])*` pairs (spec §6 chunk batch payload).
fn parse_length_prefixed(data: &[u8]) -> Result<Vec<Vec<u8>>, EngineError> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if i + 4 > data.len() {
            return Err(EngineError::Protocol(ProtocolError::Malformed("truncated length prefix".into())));
        }
        let len = u32::from_le_bytes(data[i..i + 4].try_into().unwrap()) as usize;
        i += 4;
        if i + len > data.len() {
            return Err(EngineError::Protocol(ProtocolError::Malformed("truncated chunk body".into())));
        }
        out.push(data[i..i + len].to_vec());
        i += len;
    }
    Ok(out)
}
