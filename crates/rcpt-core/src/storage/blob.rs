//! Content-addressed blob stores.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::{BlobStore, Result};
use crate::error::StoreError;

/// Blob path for `data`: its lowercase hex SHA-256.
fn blob_key(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn is_blob_key(path: &str) -> bool {
    path.len() == 64 && path.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Stores blobs as files named by content hash under one directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// An existing blob whose bytes still hash to `key`.
    fn is_intact(&self, target: &Path, key: &str) -> bool {
        match fs::read(target) {
            Ok(existing) => blob_key(&existing) == key,
            Err(_) => false,
        }
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, data: &[u8]) -> Result<String> {
        let key = blob_key(data);
        let target = self.root.join(&key);
        if self.is_intact(&target, &key) {
            return Ok(key);
        }

        // Readers only ever see a complete file: write aside, then rename over the key.
        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        debug!("Stored blob {} ({} bytes)", key, data.len());
        Ok(key)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        if !is_blob_key(path) {
            return Err(StoreError::BlobNotFound(path.to_string()));
        }
        fs::read(self.root.join(path)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::BlobNotFound(path.to_string()),
            _ => StoreError::Io(e),
        })
    }
}

/// Keeps blobs in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn store(&self, data: &[u8]) -> Result<String> {
        let key = blob_key(data);
        self.blobs
            .lock()
            .map_err(|_| StoreError::Invariant("blob lock poisoned".to_string()))?
            .entry(key.clone())
            .or_insert_with(|| data.to_vec());
        Ok(key)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Invariant("blob lock poisoned".to_string()))?
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs")).unwrap();

        let path = store.store(b"%PDF-1.4 body").unwrap();
        assert_eq!(path.len(), 64);
        assert_eq!(store.read(&path).unwrap(), b"%PDF-1.4 body".to_vec());

        // Same content, same path.
        assert_eq!(store.store(b"%PDF-1.4 body").unwrap(), path);
    }

    #[test]
    fn test_fs_store_replaces_partial_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        let data = b"%PDF-1.4 a complete document body".to_vec();

        // Leftover from an interrupted write
        fs::write(dir.path().join(blob_key(&data)), &data[..8]).unwrap();

        let path = store.store(&data).unwrap();
        assert_eq!(store.read(&path).unwrap(), data);
    }

    #[test]
    fn test_fs_store_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsBlobStore::new(dir.path()).unwrap());
        let data = vec![7u8; 256 * 1024];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let data = data.clone();
                std::thread::spawn(move || {
                    let path = store.store(&data).unwrap();
                    store.read(&path).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), data);
        }
        // No staging files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_fs_store_rejects_unknown_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.read("../etc/passwd"),
            Err(StoreError::BlobNotFound(_))
        ));
        assert!(matches!(
            store.read(&"0".repeat(64)),
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new();
        let a = store.store(b"one").unwrap();
        let b = store.store(b"two").unwrap();

        assert_ne!(a, b);
        assert_eq!(store.read(&b).unwrap(), b"two".to_vec());
        assert!(matches!(store.read("missing"), Err(StoreError::BlobNotFound(_))));
    }
}
