//! Client-side driver for upload and download (spec §4.10, §6).
//!
//! Grounded on the teacher's `io_stream::SixCyWriter`/`SixCyReader` for the
//! "split into fixed-size wire chunks, stream, reassemble" shape, adapted
//! from local archive I/O to the network session protocol.

use std::fs;
use std::net::TcpStream;
use std::path::Path;

use crate::chunker::{Chunker, FixedSizeChunker};
use crate::config::Config;
use crate::crypto::{self, IvCounter};
use crate::error::{EngineError, ProtocolError};
use crate::protocol::{EcdhHandshake, Frame, MessageType, NetworkHeader, TcpTransport, Transport};
use crate::types::{Fingerprint, RecipeHeader, RECIPE_HEADER_SIZE};

fn connect(config: &Config) -> Result<(TcpTransport, [u8; 16]), EngineError> {
    let addr = format!("{}:{}", config.transport.storage_server_ip, config.transport.storage_server_port);
    let stream = TcpStream::connect(&addr)?;
    let mut transport = TcpTransport::new(stream);

    // Attestation-Decision (spec §4.8 `START --recv Attestation-Decision-->
    // {ATTEST|SKIP}`): whether an `AttestationConfig` is present decides
    // which branch the server takes before the ECDH handshake.
    let decision = if config.attestation.is_some() { MessageType::SgxRaNeed } else { MessageType::SgxRaNotNeed };
    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: decision as u32, client_id: config.transport.client_id, data_size: 0, current_item_num: 0 },
        payload: Vec::new(),
    })?;

    let handshake = EcdhHandshake::new();
    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: MessageType::SessionKeyInit as u32, client_id: config.transport.client_id, data_size: 0, current_item_num: 0 },
        payload: handshake.public_point().as_bytes().to_vec(),
    })?;

    let reply = transport.recv_frame()?;
    if MessageType::from_u32(reply.header.message_type) != Some(MessageType::SessionKeyReply) {
        return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage { got: reply.header.message_type, state: "SessionKeyReply" }));
    }
    let peer_point = p256::EncodedPoint::from_bytes(&reply.payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let session_key = handshake.derive_session_key(&peer_point)?;
    Ok((transport, session_key))
}

fn login(transport: &mut TcpTransport, config: &Config, session_key: &[u8; 16], master_key: &[u8; 32], file_name_hash: [u8; 32], msg: MessageType) -> Result<(), EngineError> {
    let mut payload = Vec::with_capacity(64);
    payload.extend_from_slice(&file_name_hash);
    payload.extend_from_slice(&crypto::session_xor(session_key, master_key));
    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: msg as u32, client_id: config.transport.client_id, data_size: payload.len() as u32, current_item_num: 0 },
        payload,
    })?;
    Ok(())
}

fn file_name_hash(path: &Path) -> [u8; 32] {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Fingerprint::of(name.as_bytes()).0
}

/// Upload the file at `path` to the server configured in `config` (spec §6
/// CLI `-t u -i <path>`).
pub fn upload(config: &Config, path: &Path) -> Result<(), EngineError> {
    let data = fs::read(path)?;
    let master_key = crypto::derive_master_key(config.crypto.local_secret.as_bytes());
    let name_hash = file_name_hash(path);

    let (mut transport, session_key) = connect(config)?;
    login(&mut transport, config, &session_key, &master_key, name_hash, MessageType::ClientLoginUpload)?;

    let mut chunker = FixedSizeChunker::new(config.chunking.avg_chunk_size as usize);
    let chunks = chunker.chunk(&data);
    let mut iv_counter = IvCounter::new();

    let batch_size = config.transport.send_chunk_batch_size as usize;
    for batch in chunks.chunks(batch_size.max(1)) {
        let mut plain = Vec::new();
        for chunk in batch {
            plain.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            plain.extend_from_slice(chunk);
        }
        let iv = iv_counter.advance();
        let cipher = crypto::encrypt_128(&session_key, &iv, &plain)?;
        let mut payload = Vec::with_capacity(16 + cipher.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&cipher);

        transport.send_frame(&Frame {
            header: NetworkHeader {
                message_type: MessageType::ClientUploadChunk as u32,
                client_id: config.transport.client_id,
                data_size: payload.len() as u32,
                current_item_num: batch.len() as u32,
            },
            payload,
        })?;
    }

    let header = RecipeHeader { file_size: data.len() as u64, chunk_count: chunks.len() as u64 };
    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: MessageType::ClientUploadRecipeEnd as u32, client_id: config.transport.client_id, data_size: RECIPE_HEADER_SIZE as u32, current_item_num: 0 },
        payload: header.to_bytes().to_vec(),
    })?;

    log::info!("uploaded {} ({} bytes, {} chunks)", path.display(), data.len(), chunks.len());
    Ok(())
}

/// Download the file identified by `path`'s name, writing the restored
/// bytes to `<path>.restored` (spec §6 CLI `-t d -i <path>`).
pub fn download(config: &Config, path: &Path) -> Result<(), EngineError> {
    let master_key = crypto::derive_master_key(config.crypto.local_secret.as_bytes());
    let name_hash = file_name_hash(path);

    let (mut transport, session_key) = connect(config)?;
    login(&mut transport, config, &session_key, &master_key, name_hash, MessageType::ClientLoginDownload)?;

    transport.send_frame(&Frame {
        header: NetworkHeader { message_type: MessageType::ClientRestoreReady as u32, client_id: config.transport.client_id, data_size: 0, current_item_num: 0 },
        payload: Vec::new(),
    })?;

    let mut restored = Vec::new();
    loop {
        let frame = transport.recv_frame()?;
        match MessageType::from_u32(frame.header.message_type) {
            Some(MessageType::ServerFileNonExist) => {
                return Err(EngineError::NotFound(path.display().to_string()));
            }
            Some(MessageType::ServerRestoreChunk) => {
                if frame.payload.len() < 16 {
                    return Err(EngineError::Protocol(ProtocolError::Malformed("restore chunk payload too short".into())));
                }
                let (iv_bytes, cipher) = frame.payload.split_at(16);
                let iv: [u8; 16] = iv_bytes.try_into().unwrap();
                let plain = crypto::decrypt_128(&session_key, &iv, cipher)?;

                let mut i = 0usize;
                while i < plain.len() {
                    let len = u32::from_le_bytes(plain[i..i + 4].try_into().unwrap()) as usize;
                    i += 4;
                    restored.extend_from_slice(&plain[i..i + len]);
                    i += len;
                }
            }
            Some(MessageType::ServerRestoreFinal) => break,
            other => {
                return Err(EngineError::Protocol(ProtocolError::UnexpectedMessage {
                    got: other.map(|m| m as u32).unwrap_or(frame.header.message_type),
                    state: "Download",
                }));
            }
        }
    }

    let out_path = path.with_extension("restored");
    fs::write(&out_path, &restored)?;
    log::info!("restored {} bytes to {}", restored.len(), out_path.display());
    Ok(())
}

/// Run the client-side half of the attestation handshake in isolation (spec
/// §6 CLI `-t a`): connect, exchange the Attestation-Decision and ECDH
/// frames, then drop the connection. The RA msg01-4 exchange itself is out
/// of scope (spec §1 Non-goals) — the server's default `NullAttestor`
/// accepts unconditionally whenever the decision is `ATTEST`.
pub fn attest(config: &Config) -> Result<(), EngineError> {
    connect(config)?;
    log::info!(
        "attestation decision sent: {}",
        if config.attestation.is_some() { "ATTEST (NullAttestor accepts)" } else { "SKIP" }
    );
    Ok(())
}
