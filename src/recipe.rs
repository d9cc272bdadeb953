//! RecipeWriter / RecipeReader (spec §4.6).
//!
//! Grounded on the teacher's `SixCyWriter::finalize` pattern — reserve the
//! header at offset 0, append the body, seek back and patch the header once
//! the true totals are known — generalized from "one archive superblock" to
//! the recipe file's own 16-byte `(file_size, chunk_count)` header. Each
//! flushed batch of entries is framed as `(u32 cipher_len) || cipher ||
//! iv_16` so `RecipeReader` can stream batches back without needing the
//! original batch size in advance.
//!
//! A BLAKE3 digest over every entry (write order) is sealed beside the
//! recipe via [`crate::persistence::seal_recipe_integrity`] rather than in
//! the header itself — the on-disk header is the spec's fixed 16-byte
//! `(file_size, chunk_count)` pair with no room to spare.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::crypto::{self, IvCounter};
use crate::error::ConfigError;
use crate::persistence;
use crate::types::{ChunkAddress, RecipeHeader, RECIPE_ENTRY_SIZE, RECIPE_HEADER_SIZE};

/// Appends batches of `RecipeEntry` to a growing file, encrypted under the
/// file's master key. The true header is only known at `finalize`, so a
/// placeholder is reserved up front and patched in afterward.
pub struct RecipeWriter {
    file: File,
    path: PathBuf,
    master_key: [u8; 32],
    iv_counter: IvCounter,
    chunk_count: u64,
    file_size: u64,
    integrity: blake3::Hasher,
}

impl RecipeWriter {
    pub fn create<P: AsRef<Path>>(path: P, master_key: [u8; 32]) -> Result<Self, ConfigError> {
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        file.write_all(&[0u8; RECIPE_HEADER_SIZE])?;
        Ok(RecipeWriter {
            file,
            path: path.as_ref().to_path_buf(),
            master_key,
            iv_counter: IvCounter::new(),
            chunk_count: 0,
            file_size: 0,
            integrity: blake3::Hasher::new(),
        })
    }

    /// Encrypt and append one batch of entries (spec §4.6: "append blocks of
    /// RecipeEntry after an encrypted transform").
    pub fn write_batch(&mut self, entries: &[ChunkAddress], chunk_total_bytes: u64) -> Result<(), ConfigError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut plain = Vec::with_capacity(entries.len() * RECIPE_ENTRY_SIZE);
        for e in entries {
            let bytes = e.to_bytes();
            self.integrity.update(&bytes);
            plain.extend_from_slice(&bytes);
        }

        let iv = self.iv_counter.advance();
        let cipher = crypto::encrypt_256(&self.master_key, &iv, &plain)
            .map_err(|e| ConfigError::Invalid(format!("recipe encryption failed: {e}")))?;

        self.file.write_u32::<LittleEndian>(cipher.len() as u32)?;
        self.file.write_all(&cipher)?;
        self.file.write_all(&iv)?;

        self.chunk_count += entries.len() as u64;
        self.file_size += chunk_total_bytes;
        Ok(())
    }

    /// Patch the header with final totals (spec §4.6 "finalize by seeking to
    /// offset 0") and seal the entry-order integrity hash beside the file.
    pub fn finalize(mut self) -> Result<(), ConfigError> {
        let header = RecipeHeader { file_size: self.file_size, chunk_count: self.chunk_count };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.sync_all()?;
        persistence::seal_recipe_integrity(&self.path, self.integrity.finalize().into())?;
        Ok(())
    }
}

/// Reads a recipe file back in header-then-batches order (spec §4.6).
pub struct RecipeReader {
    file: File,
    path: PathBuf,
    master_key: [u8; 32],
    pub header: RecipeHeader,
}

impl RecipeReader {
    pub fn open<P: AsRef<Path>>(path: P, master_key: [u8; 32]) -> Result<Self, ConfigError> {
        let mut file = File::open(&path)?;
        let mut header_buf = [0u8; RECIPE_HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        Ok(RecipeReader { file, path: path.as_ref().to_path_buf(), master_key, header: RecipeHeader::from_bytes(&header_buf) })
    }

    /// Read the next encrypted batch frame, returning `None` at EOF.
    pub fn next_batch(&mut self) -> Result<Option<Vec<ChunkAddress>>, ConfigError> {
        let cipher_len = match self.file.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let mut cipher = vec![0u8; cipher_len as usize];
        self.file.read_exact(&mut cipher)?;
        let mut iv = [0u8; 16];
        self.file.read_exact(&mut iv)?;

        let plain = crypto::decrypt_256(&self.master_key, &iv, &cipher)
            .map_err(|_| ConfigError::Invalid("recipe batch authentication failed".into()))?;

        if plain.len() % RECIPE_ENTRY_SIZE != 0 {
            return Err(ConfigError::Invalid("recipe batch is not entry-aligned".into()));
        }

        let entries = plain
            .chunks_exact(RECIPE_ENTRY_SIZE)
            .map(|chunk| ChunkAddress::from_bytes(chunk.try_into().unwrap()))
            .collect();
        Ok(Some(entries))
    }

    /// Read the whole recipe and confirm its entries hash to the sealed
    /// sidecar hash, without handing the caller the entries themselves
    /// (spec §4.9-adjacent: a standalone health check, distinct from
    /// driving an actual restore). A missing sidecar fails verification
    /// rather than panicking — it means the recipe was never finalized.
    pub fn verify_integrity(&mut self) -> Result<bool, ConfigError> {
        let mut hasher = blake3::Hasher::new();
        while let Some(entries) = self.next_batch()? {
            for e in &entries {
                hasher.update(&e.to_bytes());
            }
        }
        let computed: [u8; 32] = hasher.finalize().into();
        match persistence::unseal_recipe_integrity(&self.path)? {
            Some(sealed) => Ok(computed == sealed),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test-recipe");
        let key = [3u8; 32];

        let mut writer = RecipeWriter::create(&path, key).unwrap();
        let batch1 = vec![
            ChunkAddress { container_id: 1, offset: 0, length: 100 },
            ChunkAddress { container_id: 1, offset: 100, length: 50 },
        ];
        let batch2 = vec![ChunkAddress { container_id: 2, offset: 0, length: 200 }];
        writer.write_batch(&batch1, 150).unwrap();
        writer.write_batch(&batch2, 200).unwrap();
        writer.finalize().unwrap();

        let mut reader = RecipeReader::open(&path, key).unwrap();
        assert_eq!(reader.header.file_size, 350);
        assert_eq!(reader.header.chunk_count, 3);

        let got1 = reader.next_batch().unwrap().unwrap();
        assert_eq!(got1, batch1);
        let got2 = reader.next_batch().unwrap().unwrap();
        assert_eq!(got2, batch2);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty-recipe");
        let key = [1u8; 32];
        let mut writer = RecipeWriter::create(&path, key).unwrap();
        writer.write_batch(&[], 0).unwrap();
        writer.finalize().unwrap();

        let mut reader = RecipeReader::open(&path, key).unwrap();
        assert_eq!(reader.header.chunk_count, 0);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn integrity_hash_detects_a_dropped_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("integrity-recipe");
        let key = [9u8; 32];

        let mut writer = RecipeWriter::create(&path, key).unwrap();
        let batch = vec![
            ChunkAddress { container_id: 1, offset: 0, length: 10 },
            ChunkAddress { container_id: 1, offset: 10, length: 20 },
        ];
        writer.write_batch(&batch, 30).unwrap();
        writer.finalize().unwrap();

        let mut reader = RecipeReader::open(&path, key).unwrap();
        assert!(reader.verify_integrity().unwrap());

        // A sidecar carrying a stale hash (as if an entry had been dropped
        // after it was sealed) must fail verification.
        crate::persistence::seal_recipe_integrity(&path, [0u8; 32]).unwrap();
        let mut tampered = RecipeReader::open(&path, key).unwrap();
        assert!(!tampered.verify_integrity().unwrap());
    }
}
