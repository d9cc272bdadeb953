//! Container packing and on-disk container storage (spec §4.2, §6).
//!
//! Grounded on the teacher's `io_stream::SixCyWriter` chunk-append loop
//! (compress -> encrypt -> append -> record offset), generalized from "one
//! growing file per archive" to "rotate into fresh fixed-capacity
//! containers, hand full ones to a writer queue."

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::error::StoreError;
use crate::types::ChunkAddress;

/// 4 MiB — spec §3.
pub const MAX_CONTAINER_SIZE: u32 = 1 << 22;
/// IV suffix stored after every chunk payload (spec §3).
pub const IV_LEN: u32 = 16;

/// An in-memory container being filled by one client session. Never
/// rewritten once flushed (spec §3 lifecycle).
pub struct Container {
    pub id: u64,
    pub body: Vec<u8>,
    pub cur_size: u32,
}

impl Container {
    pub fn new_random() -> Self {
        Container {
            id: rand::thread_rng().next_u64(),
            body: Vec::with_capacity(MAX_CONTAINER_SIZE as usize),
            cur_size: 0,
        }
    }
}

/// Appends chunks into a fixed-capacity container, rotating and flushing to
/// `store` on overflow. Owned exclusively by one `ClientSession` (spec §3).
pub struct ContainerPacker<'s> {
    current: Container,
    store: &'s ContainerStore,
}

impl<'s> ContainerPacker<'s> {
    pub fn new(store: &'s ContainerStore) -> Self {
        ContainerPacker {
            current: Container::new_random(),
            store,
        }
    }

    /// Append `cipher || iv` to the current container, rotating to a fresh
    /// one if it would overflow `MAX_CONTAINER_SIZE` (spec §4.2 algorithm).
    pub fn save_chunk(&mut self, cipher: &[u8], iv: &[u8; 16]) -> Result<ChunkAddress, StoreError> {
        let length = cipher.len() as u32;
        debug_assert!(
            length + IV_LEN <= MAX_CONTAINER_SIZE,
            "a single chunk must never exceed the container capacity"
        );

        if self.current.cur_size + length + IV_LEN > MAX_CONTAINER_SIZE {
            self.flush()?;
            self.current = Container::new_random();
        }

        let address = ChunkAddress {
            container_id: self.current.id,
            offset: self.current.cur_size,
            length,
        };
        self.current.body.extend_from_slice(cipher);
        self.current.body.extend_from_slice(iv);
        self.current.cur_size += length + IV_LEN;

        Ok(address)
    }

    /// Flush the current container to the store (full or partial — called
    /// both on overflow rotation and at session end).
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.current.cur_size == 0 {
            return Ok(());
        }
        self.store.write_container(self.current.id, &self.current.body)?;
        log::debug!(
            "flushed container {:016x} ({} bytes)",
            self.current.id,
            self.current.cur_size
        );
        Ok(())
    }

    /// Flush any partial container at session end (spec §4.5 tail batch).
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.flush()
    }
}

/// On-disk directory of container files, shared across sessions (spec §5:
/// "container ids are 8-byte random tokens, collision probability
/// negligible, so writers do not coordinate").
pub struct ContainerStore {
    root: PathBuf,
}

impl ContainerStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_owned();
        fs::create_dir_all(&root)?;
        Ok(ContainerStore { root })
    }

    fn path_for(&self, container_id: u64) -> PathBuf {
        self.root.join(format!("{container_id:016x}-container"))
    }

    pub fn write_container(&self, container_id: u64, body: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(container_id);
        let mut f = File::create(&path)?;
        f.write_all(body)?;
        f.sync_all()?;
        Ok(())
    }

    pub fn exists(&self, container_id: u64) -> bool {
        self.path_for(container_id).is_file()
    }

    pub fn read_container(&self, container_id: u64) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(container_id);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::ContainerNotFound(container_id)
            } else {
                StoreError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn single_chunk_never_straddles_containers() {
        let dir = tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = ContainerPacker::new(&store);

        let addr = packer.save_chunk(&[0xAB; 100], &[0u8; 16]).unwrap();
        assert_eq!(addr.offset, 0);
        assert_eq!(addr.length, 100);
        assert!(addr.offset + addr.length <= MAX_CONTAINER_SIZE);
        packer.finish().unwrap();
        assert!(store.exists(addr.container_id));
    }

    #[test]
    fn rollover_on_overflow() {
        let dir = tempdir().unwrap();
        let store = ContainerStore::new(dir.path()).unwrap();
        let mut packer = ContainerPacker::new(&store);

        // Chunk size chosen so exactly 3 fit per container (cur_size counts
        // chunk + IV), forcing a rollover on the 4th.
        let per_chunk = MAX_CONTAINER_SIZE / 3 - IV_LEN;
        let chunk = vec![0x11u8; per_chunk as usize];

        let a1 = packer.save_chunk(&chunk, &[1u8; 16]).unwrap();
        let a2 = packer.save_chunk(&chunk, &[2u8; 16]).unwrap();
        let a3 = packer.save_chunk(&chunk, &[3u8; 16]).unwrap();
        let a4 = packer.save_chunk(&chunk, &[4u8; 16]).unwrap();

        assert_eq!(a1.container_id, a2.container_id);
        assert_eq!(a2.container_id, a3.container_id);
        assert_ne!(a3.container_id, a4.container_id, "4th chunk must rotate");
        assert_eq!(a4.offset, 0, "new container starts at offset 0");

        packer.finish().unwrap();
        assert!(store.exists(a1.container_id));
        assert!(store.exists(a4.container_id));
    }
}
