// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-addressed blob store for record ciphertext.
//!
//! A blob's id is `sha256:<hex digest>` of its bytes. Every `get` re-hashes
//! what it read, so a swapped or corrupted blob is reported as
//! [`StoreError::IntegrityViolation`] instead of being handed to the decoder.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use super::{StoragePaths, StoreError, StoreResult};

const CONTENT_ID_PREFIX: &str = "sha256:";

/// Identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Content id of `bytes`.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!(
            "{CONTENT_ID_PREFIX}{}",
            alloy::hex::encode(Sha256::digest(bytes))
        ))
    }

    /// Parse a `sha256:<64 hex>` string.
    pub fn parse(value: &str) -> StoreResult<Self> {
        let digest = value
            .strip_prefix(CONTENT_ID_PREFIX)
            .ok_or_else(|| StoreError::InvalidContentId(value.to_string()))?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidContentId(value.to_string()));
        }
        Ok(Self(format!("{CONTENT_ID_PREFIX}{}", digest.to_ascii_lowercase())))
    }

    /// Hex digest without the prefix.
    pub fn digest_hex(&self) -> &str {
        &self.0[CONTENT_ID_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn verify(&self, bytes: &[u8]) -> StoreResult<()> {
        let actual = ContentId::for_bytes(bytes);
        if &actual != self {
            return Err(StoreError::IntegrityViolation(format!(
                "blob {} hashed to {}",
                self.0, actual.0
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque ciphertext storage addressed by content hash.
pub trait BlobStore: Send + Sync {
    fn put(&self, bytes: Vec<u8>) -> impl Future<Output = StoreResult<ContentId>> + Send;

    fn get(&self, id: &ContentId) -> impl Future<Output = StoreResult<Vec<u8>>> + Send;
}

/// Blobs held in process memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace stored bytes without updating the id.
    #[cfg(test)]
    pub(crate) fn corrupt(&self, id: &ContentId, bytes: Vec<u8>) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(id.clone(), bytes);
        }
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> StoreResult<ContentId> {
        let id = ContentId::for_bytes(&bytes);
        self.blobs
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> StoreResult<Vec<u8>> {
        let bytes = self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(id.to_string()))?;
        id.verify(&bytes)?;
        Ok(bytes)
    }
}

/// Blobs stored as files under `<data_dir>/blobs/`.
pub struct FsBlobStore {
    paths: StoragePaths,
}

impl FsBlobStore {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }
}

impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> StoreResult<ContentId> {
        let id = ContentId::for_bytes(&bytes);
        let path = self.paths.blob(id.digest_hex());
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }

        tokio::fs::create_dir_all(self.paths.blobs_dir()).await?;
        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(content_id = %id, size = bytes.len(), "Stored blob");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> StoreResult<Vec<u8>> {
        let path = self.paths.blob(id.digest_hex());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::BlobNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        id.verify(&bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_is_sha256_of_bytes() {
        let id = ContentId::for_bytes(b"abc");
        assert_eq!(
            id.as_str(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(ContentId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_other_schemes() {
        assert!(ContentId::parse("ipfs://Qm123").is_err());
        assert!(ContentId::parse("sha256:abc").is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        let id = store.put(b"ciphertext".to_vec()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), b"ciphertext");
    }

    #[tokio::test]
    async fn memory_store_detects_swapped_blob() {
        let store = MemoryBlobStore::new();
        let id = store.put(b"original".to_vec()).await.unwrap();
        store.corrupt(&id, b"swapped".to_vec());

        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::IntegrityViolation(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_round_trip_and_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(StoragePaths::new(dir.path()));

        let id = store.put(vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), vec![1, 2, 3]);
        // Same content, same id
        assert_eq!(store.put(vec![1, 2, 3]).await.unwrap(), id);

        let missing = ContentId::for_bytes(b"never stored");
        assert!(matches!(
            store.get(&missing).await,
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_detects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(dir.path());
        let store = FsBlobStore::new(paths.clone());

        let id = store.put(b"original".to_vec()).await.unwrap();
        std::fs::write(paths.blob(id.digest_hex()), b"tampered").unwrap();

        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::IntegrityViolation(_))
        ));
    }
}
