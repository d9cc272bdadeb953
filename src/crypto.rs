//! Chunk/recipe encryption, counter IVs, and the deterministic transform
//! used to make the outer index searchable.
//!
//! Grounded on the teacher's `crypto` module (AES-256-GCM, nonce-prepended
//! ciphertext) generalized from a random-nonce-per-call scheme to the
//! counter-IV scheme spec.md §4.1/§9 requires (no reuse within a session,
//! sequence is implementation-defined).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use crate::error::CryptoError;

/// AAD bound to every chunk/recipe/session-frame encryption (spec §4.1, §6).
pub const AAD: [u8; 16] = *b"debedup-chunk-v1";

/// Per-session IV counter. A 16-byte big-endian counter, incremented once
/// per encryption by the caller before use (spec §9: "the spec only
/// requires no reuse; the precise sequence is implementation-defined").
#[derive(Debug, Clone, Copy, Default)]
pub struct IvCounter(u128);

impl IvCounter {
    pub fn new() -> Self {
        IvCounter(0)
    }

    /// Advance and return the new counter value as a 16-byte big-endian IV.
    /// GCM only consumes the first 12 bytes as a nonce; the remaining 4
    /// bytes are kept so the full 128-bit counter can be persisted and
    /// compared without truncation ambiguity.
    pub fn advance(&mut self) -> [u8; 16] {
        self.0 = self.0.wrapping_add(1);
        self.0.to_be_bytes()
    }
}

fn nonce12(iv16: &[u8; 16]) -> [u8; 12] {
    iv16[4..16].try_into().unwrap()
}

/// Encrypt `plaintext` under AES-256-GCM using an explicit counter IV.
/// Returns the ciphertext (same length as plaintext, GCM tag appended).
pub fn encrypt_256(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = Nonce::from_slice(&nonce12(iv));
    let payload = aes_gcm::aead::Payload { msg: plaintext, aad: &AAD };
    cipher
        .encrypt(nonce, payload)
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub fn decrypt_256(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AuthError)?;
    let nonce = Nonce::from_slice(&nonce12(iv));
    let payload = aes_gcm::aead::Payload { msg: ciphertext, aad: &AAD };
    cipher.decrypt(nonce, payload).map_err(|_| CryptoError::AuthError)
}

/// AES-128-GCM variant used for the wire session-key channel (spec §6).
pub fn encrypt_128(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = Nonce::from_slice(&nonce12(iv));
    let payload = aes_gcm::aead::Payload { msg: plaintext, aad: &AAD };
    cipher
        .encrypt(nonce, payload)
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub fn decrypt_128(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::AuthError)?;
    let nonce = Nonce::from_slice(&nonce12(iv));
    let payload = aes_gcm::aead::Payload { msg: ciphertext, aad: &AAD };
    cipher.decrypt(nonce, payload).map_err(|_| CryptoError::AuthError)
}

/// XOR keystream cipher for the login payload's `session_key_enc(master_key)`
/// field (spec §6: 32 bytes on the wire, leaving no room for a GCM tag).
/// Symmetric — the same call encrypts and decrypts. Never used for chunk,
/// recipe, or container data, which always go through authenticated
/// AES-GCM.
pub fn session_xor(session_key: &[u8; 16], data: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut keystream = Vec::with_capacity(data.len());
    let mut counter: u32 = 0;
    while keystream.len() < data.len() {
        let mut hasher = Sha256::new();
        hasher.update(session_key);
        hasher.update(counter.to_le_bytes());
        keystream.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    data.iter().zip(keystream).map(|(b, k)| b ^ k).collect()
}

/// Derive the per-file master key from the client's long-term secret
/// (spec §6 crypto config: `local_secret` seeds `SHA256(local_secret)`).
pub fn derive_master_key(local_secret: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(local_secret);
    hasher.finalize().into()
}

/// Deterministic encryption for the outer index (spec §3, §9: "AES-CMC —
/// double-pass CBC with bytewise reversal between passes"). Equal
/// plaintexts yield equal ciphertexts, which is what makes the outer index
/// searchable by encrypted fingerprint without revealing equality to an
/// observer who does not hold `key`. This is NOT semantically secure
/// encryption; it intentionally leaks equality, as the outer index needs.
///
/// CBC requires the input to be block-aligned; callers always pass a
/// 32-byte fingerprint or a 16-byte `ChunkAddress` encoding, both multiples
/// of the AES block size, so no padding scheme is needed here.
pub fn cmc_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    assert_eq!(plaintext.len() % 16, 0, "CMC input must be block-aligned");
    let pass1 = cbc_encrypt_zero_iv(key, plaintext);
    let mut reversed = pass1;
    reversed.reverse();
    cbc_encrypt_zero_iv(key, &reversed)
}

pub fn cmc_decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Vec<u8> {
    assert_eq!(ciphertext.len() % 16, 0, "CMC input must be block-aligned");
    let mut pass1 = cbc_decrypt_zero_iv(key, ciphertext);
    pass1.reverse();
    cbc_decrypt_zero_iv(key, &pass1)
}

/// Plain AES-256-CBC with a fixed zero IV. Used only as the inner primitive
/// of [`cmc_encrypt`]/[`cmc_decrypt`], where determinism is the point — CBC
/// with a zero IV is never used directly for confidential chunk data.
fn cbc_encrypt_zero_iv(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    use aes::cipher::{BlockEncrypt, KeyInit as _};
    use aes::Aes256;
    let cipher = Aes256::new_from_slice(key).expect("32-byte key");
    let mut prev = [0u8; 16];
    let mut out = Vec::with_capacity(data.len());
    for block in data.chunks(16) {
        let mut buf = [0u8; 16];
        for i in 0..16 {
            buf[i] = block[i] ^ prev[i];
        }
        let mut ga = aes::cipher::generic_array::GenericArray::clone_from_slice(&buf);
        cipher.encrypt_block(&mut ga);
        out.extend_from_slice(&ga);
        prev.copy_from_slice(&ga);
    }
    out
}

fn cbc_decrypt_zero_iv(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    use aes::cipher::{BlockDecrypt, KeyInit as _};
    use aes::Aes256;
    let cipher = Aes256::new_from_slice(key).expect("32-byte key");
    let mut prev = [0u8; 16];
    let mut out = Vec::with_capacity(data.len());
    for block in data.chunks(16) {
        let mut ga = aes::cipher::generic_array::GenericArray::clone_from_slice(block);
        let cipher_block: [u8; 16] = ga.into();
        cipher.decrypt_block(&mut ga);
        let mut plain = [0u8; 16];
        for i in 0..16 {
            plain[i] = ga[i] ^ prev[i];
        }
        out.extend_from_slice(&plain);
        prev = cipher_block;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_round_trip() {
        let key = [7u8; 32];
        let mut ctr = IvCounter::new();
        let iv = ctr.advance();
        let plain = b"hello deduplicated world";
        let cipher = encrypt_256(&key, &iv, plain).unwrap();
        let back = decrypt_256(&key, &iv, &cipher).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn iv_counter_never_repeats() {
        let mut ctr = IvCounter::new();
        let a = ctr.advance();
        let b = ctr.advance();
        assert_ne!(a, b);
    }

    #[test]
    fn cmc_is_deterministic_and_invertible() {
        let key = [3u8; 32];
        let fp = [9u8; 32];
        let c1 = cmc_encrypt(&key, &fp);
        let c2 = cmc_encrypt(&key, &fp);
        assert_eq!(c1, c2, "equal plaintexts must yield equal ciphertexts");
        assert_eq!(cmc_decrypt(&key, &c1), fp);
    }

    #[test]
    fn session_xor_round_trips() {
        let key = [4u8; 16];
        let master_key = [9u8; 32];
        let enc = session_xor(&key, &master_key);
        assert_ne!(enc, master_key);
        assert_eq!(session_xor(&key, &enc), master_key);
    }

    #[test]
    fn cmc_distinguishes_unequal_plaintexts() {
        let key = [3u8; 32];
        let a = cmc_encrypt(&key, &[1u8; 32]);
        let b = cmc_encrypt(&key, &[2u8; 32]);
        assert_ne!(a, b);
    }
}
