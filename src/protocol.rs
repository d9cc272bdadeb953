//! Wire protocol framing, message types, and session-key exchange (spec
//! §4.10, §6).
//!
//! Grounded on the teacher's `block::{BlockHeader, encode_block,
//! decode_block}` (fixed-size LE header + CRC32 + payload framing pattern),
//! generalized from block-in-archive framing to frame-on-the-wire framing:
//! `(u32 payload_size) || NetworkHeader || payload`.

use std::io::{Read, Write};
use std::net::TcpStream;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use p256::ecdh::EphemeralSecret;
use p256::{EncodedPoint, PublicKey};
use rand::rngs::OsRng;

use crate::error::ProtocolError;

/// Matches spec.md §6: control frames are capped at this size; bulk frames
/// are sized by `data_size` instead.
pub const MAX_SGX_MESSAGE_SIZE: usize = 4096;

/// The 22 message types enumerated in spec.md §6, exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    ClientUploadChunk = 0,
    ClientUploadRecipeEnd = 1,
    ClientLoginUpload = 2,
    ClientLoginDownload = 3,
    ClientRestoreReady = 4,
    ServerRestoreChunk = 5,
    ServerRestoreFinal = 6,
    ServerLoginResponse = 7,
    ServerFileNonExist = 8,
    SgxRaMsg01 = 9,
    SgxRaMsg2 = 10,
    SgxRaMsg3 = 11,
    SgxRaMsg4 = 12,
    SgxRaNeed = 13,
    SgxRaNotNeed = 14,
    SgxRaNotSupport = 15,
    SessionKeyInit = 16,
    SessionKeyReply = 17,
    ClientKeyGen = 18,
    KeyManagerKeyGenReply = 19,
    ClientUploadRecipe = 20,
}

impl MessageType {
    pub fn from_u32(v: u32) -> Option<Self> {
        use MessageType::*;
        Some(match v {
            0 => ClientUploadChunk,
            1 => ClientUploadRecipeEnd,
            2 => ClientLoginUpload,
            3 => ClientLoginDownload,
            4 => ClientRestoreReady,
            5 => ServerRestoreChunk,
            6 => ServerRestoreFinal,
            7 => ServerLoginResponse,
            8 => ServerFileNonExist,
            9 => SgxRaMsg01,
            10 => SgxRaMsg2,
            11 => SgxRaMsg3,
            12 => SgxRaMsg4,
            13 => SgxRaNeed,
            14 => SgxRaNotNeed,
            15 => SgxRaNotSupport,
            16 => SessionKeyInit,
            17 => SessionKeyReply,
            18 => ClientKeyGen,
            19 => KeyManagerKeyGenReply,
            20 => ClientUploadRecipe,
            _ => return None,
        })
    }
}

/// 16 bytes, little-endian, prefixed by a `u32` payload size on the wire
/// (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct NetworkHeader {
    pub message_type: u32,
    pub client_id: u32,
    pub data_size: u32,
    pub current_item_num: u32,
}

pub const NETWORK_HEADER_SIZE: usize = 16;

impl NetworkHeader {
    pub fn to_bytes(&self) -> [u8; NETWORK_HEADER_SIZE] {
        let mut buf = [0u8; NETWORK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.message_type.to_le_bytes());
        buf[4..8].copy_from_slice(&self.client_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.current_item_num.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; NETWORK_HEADER_SIZE]) -> Self {
        NetworkHeader {
            message_type: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            client_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            data_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            current_item_num: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// A full frame: header plus payload.
pub struct Frame {
    pub header: NetworkHeader,
    pub payload: Vec<u8>,
}

/// Abstracts over the transport so the session loop does not depend on
/// `TcpStream` directly (spec §4.10: "TLS/mTLS is an external collaborator,
/// specified only by interface").
pub trait Transport: Send {
    fn send_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError>;
    fn recv_frame(&mut self) -> Result<Frame, ProtocolError>;
}

/// Plain TCP transport — the crate's one concrete `Transport`, since mTLS
/// session setup is out of scope and specified only by interface.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }
}

impl Transport for TcpTransport {
    fn send_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let header_bytes = frame.header.to_bytes();
        let payload_size = (header_bytes.len() + frame.payload.len()) as u32;

        self.stream
            .write_u32::<LittleEndian>(payload_size)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        self.stream
            .write_all(&header_bytes)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        self.stream
            .write_all(&frame.payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(())
    }

    fn recv_frame(&mut self) -> Result<Frame, ProtocolError> {
        let payload_size = self
            .stream
            .read_u32::<LittleEndian>()
            .map_err(|e| ProtocolError::Malformed(e.to_string()))? as usize;

        if payload_size < NETWORK_HEADER_SIZE {
            return Err(ProtocolError::Malformed("frame shorter than header".into()));
        }

        let mut header_buf = [0u8; NETWORK_HEADER_SIZE];
        self.stream
            .read_exact(&mut header_buf)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let header = NetworkHeader::from_bytes(&header_buf);

        let body_len = payload_size - NETWORK_HEADER_SIZE;
        if header.data_size as usize > MAX_SGX_MESSAGE_SIZE
            && !matches!(
                MessageType::from_u32(header.message_type),
                Some(MessageType::ClientUploadChunk)
                    | Some(MessageType::ServerRestoreChunk)
                    | Some(MessageType::ClientUploadRecipe)
            )
        {
            return Err(ProtocolError::PayloadTooLarge(header.data_size as usize));
        }

        let mut payload = vec![0u8; body_len];
        self.stream
            .read_exact(&mut payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        Ok(Frame { header, payload })
    }
}

/// One side of an ECDH exchange over NIST P-256 (spec §4.10, §6
/// `SessionKeyInit`/`SessionKeyReply`).
pub struct EcdhHandshake {
    secret: EphemeralSecret,
}

impl EcdhHandshake {
    pub fn new() -> Self {
        EcdhHandshake { secret: EphemeralSecret::random(&mut OsRng) }
    }

    pub fn public_point(&self) -> EncodedPoint {
        EncodedPoint::from(self.secret.public_key())
    }

    /// Derive the shared AES-128-GCM session key from the peer's public
    /// point (spec §6: session key is used for AES-128-GCM wire framing).
    pub fn derive_session_key(&self, peer_point: &EncodedPoint) -> Result<[u8; 16], ProtocolError> {
        let peer_public = PublicKey::from_sec1_bytes(peer_point.as_bytes())
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let shared = self.secret.diffie_hellman(&peer_public);

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(shared.raw_secret_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[0..16]);
        Ok(key)
    }
}

impl Default for EcdhHandshake {
    fn default() -> Self {
        Self::new()
    }
}
