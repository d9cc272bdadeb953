//! `ChunkCodec` — compress/decrypt a single chunk (spec §4.1).
//!
//! Grounded on the teacher's `codec::Codec` trait (compress/decompress per
//! algorithm) and `block::encode_block`/`decode_block` (compress-then-
//! encrypt, verify-then-decrypt pairing), narrowed to the one codec the
//! dedup engine actually uses: LZ4 fast, with decline-if-not-smaller
//! semantics instead of the teacher's per-block UUID dispatch (the dedup
//! engine has exactly one codec, so there is no registry to consult).

use crate::crypto::{self, IvCounter};
use crate::error::{CodecError, CryptoError};
use crate::types::Fingerprint;

/// Tag byte prefixed to every stored chunk payload so the decoder does not
/// have to guess whether compression was applied (spec §4.1: "the decoder
/// distinguishes by attempting decompression and falling back" — we make
/// that distinction explicit with one byte instead of a try/fallback,
/// which is equivalent but avoids spending a decompression attempt on
/// chunks that were never compressed).
const TAG_STORED: u8 = 0x00;
const TAG_LZ4: u8 = 0x01;

/// Compress `plain` with LZ4; if the result is not strictly smaller than
/// the input, compression is declined and the original bytes are returned
/// tagged as stored-verbatim (spec §4.1).
pub fn compress(plain: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::compress_prepend_size(plain);
    if compressed.len() < plain.len() {
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(TAG_LZ4);
        out.extend_from_slice(&compressed);
        out
    } else {
        let mut out = Vec::with_capacity(plain.len() + 1);
        out.push(TAG_STORED);
        out.extend_from_slice(plain);
        out
    }
}

/// Inverse of [`compress`].
pub fn decompress(tagged: &[u8]) -> Result<Vec<u8>, CodecError> {
    let (tag, body) = tagged
        .split_first()
        .ok_or_else(|| CodecError::Decompression("empty payload".into()))?;
    match *tag {
        TAG_STORED => Ok(body.to_vec()),
        TAG_LZ4 => lz4_flex::decompress_size_prepended(body)
            .map_err(|e| CodecError::Decompression(e.to_string())),
        other => Err(CodecError::Decompression(format!("unknown codec tag {other:#04x}"))),
    }
}

/// SHA-256 of a chunk's plaintext (spec §4.1 `hash`).
pub fn hash(data: &[u8]) -> Fingerprint {
    Fingerprint::of(data)
}

/// Compress, then AES-256-GCM encrypt a chunk for container storage.
/// Returns `(stored_bytes, iv)`; the caller appends `iv` after
/// `stored_bytes` per the container layout (spec §3/§6).
pub fn encode_chunk(plain: &[u8], data_key: &[u8; 32], iv_counter: &mut IvCounter) -> Result<(Vec<u8>, [u8; 16]), CryptoError> {
    let compressed = compress(plain);
    let iv = iv_counter.advance();
    let cipher = crypto::encrypt_256(data_key, &iv, &compressed)?;
    Ok((cipher, iv))
}

/// Inverse of [`encode_chunk`]: decrypt then decompress.
pub fn decode_chunk(cipher: &[u8], data_key: &[u8; 32], iv: &[u8; 16]) -> Result<Vec<u8>, CodecError> {
    let compressed = crypto::decrypt_256(data_key, iv, cipher)
        .map_err(|_| CodecError::Decompression("chunk authentication failed".into()))?;
    decompress(&compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_zeros() {
        let data = vec![0u8; 8192];
        let key = [1u8; 32];
        let mut ctr = IvCounter::new();
        let (cipher, iv) = encode_chunk(&data, &key, &mut ctr).unwrap();
        let back = decode_chunk(&cipher, &key, &iv).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn round_trip_incompressible() {
        // Pseudo-random bytes: LZ4 should decline, compress() should tag
        // TAG_STORED, and the round trip must still be exact.
        let data: Vec<u8> = (0u32..4096)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let key = [2u8; 32];
        let mut ctr = IvCounter::new();
        let (cipher, iv) = encode_chunk(&data, &key, &mut ctr).unwrap();
        let back = decode_chunk(&cipher, &key, &iv).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash(b"abc"), hash(b"abc"));
        assert_ne!(hash(b"abc"), hash(b"abd"));
    }
}
