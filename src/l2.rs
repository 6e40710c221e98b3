//! L2: object-addressed blob store for payloads too large to inline
//! in L1. Keyed at `cache/<fingerprint>`, matching the object
//! key convention a managed blob store (e.g. an S3-style service) would use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CacheError, CacheResult};
use crate::fingerprint::Fingerprint;

/// The object key an L2 backend stores a body under.
pub fn object_key(fingerprint: &Fingerprint) -> String {
    format!("cache/{}", fingerprint.as_str())
}

/// Injected L2 backend: `put`/`get`, addressed by fingerprint. No TTL
/// here — L2 rows live as long as the owning L1 pointer does; purge is
/// driven from L1's `purge_at_millis` via the pipeline.
#[async_trait]
pub trait L2Backend: Send + Sync {
    /// Write `body` under the object key for `fingerprint`.
    async fn put(&self, fingerprint: &Fingerprint, body: Vec<u8>) -> CacheResult<()>;

    /// Read the body for `fingerprint`, if present.
    async fn get(&self, fingerprint: &Fingerprint) -> CacheResult<Option<Vec<u8>>>;

    /// Remove the object for `fingerprint`.
    async fn delete(&self, fingerprint: &Fingerprint) -> CacheResult<()>;
}

/// In-memory L2 backend for tests.
#[derive(Default)]
pub struct InMemoryL2Backend {
    objects: DashMap<String, Vec<u8>>,
}

impl InMemoryL2Backend {
    /// Construct an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl L2Backend for InMemoryL2Backend {
    async fn put(&self, fingerprint: &Fingerprint, body: Vec<u8>) -> CacheResult<()> {
        self.objects.insert(object_key(fingerprint), body);
        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.objects.get(&object_key(fingerprint)).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> CacheResult<()> {
        self.objects.remove(&object_key(fingerprint));
        Ok(())
    }
}

/// Filesystem-backed L2 implementation: one file per object under
/// `root_dir`, for single-node deployments and demos where a managed blob
/// store is unavailable.
pub struct FsL2Backend {
    root_dir: Arc<PathBuf>,
}

impl FsL2Backend {
    /// Use `root_dir` as the object root; it is created if missing.
    pub fn new(root_dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let root_dir = root_dir.into();
        std::fs::create_dir_all(&root_dir)
            .map_err(|e| CacheError::BackendFailure { tier: "L2", message: e.to_string() })?;
        Ok(Self { root_dir: Arc::new(root_dir) })
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        // Object keys use a `/` separator; flatten it into the on-disk
        // layout as a subdirectory so `cache/<fp>` maps to `cache/<fp>`.
        Path::new(self.root_dir.as_ref()).join(object_key(fingerprint))
    }
}

#[async_trait]
impl L2Backend for FsL2Backend {
    async fn put(&self, fingerprint: &Fingerprint, body: Vec<u8>) -> CacheResult<()> {
        let path = self.path_for(fingerprint);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::BackendFailure { tier: "L2", message: e.to_string() })?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| CacheError::BackendFailure { tier: "L2", message: e.to_string() })
    }

    async fn get(&self, fingerprint: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(fingerprint)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::BackendFailure { tier: "L2", message: e.to_string() }),
        }
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> CacheResult<()> {
        match tokio::fs::remove_file(self.path_for(fingerprint)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::BackendFailure { tier: "L2", message: e.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_uses_cache_prefix() {
        let fp = Fingerprint::testing_from_raw("abc123");
        assert_eq!(object_key(&fp), "cache/abc123");
    }

    #[tokio::test]
    async fn in_memory_l2_round_trips() {
        let backend = InMemoryL2Backend::new();
        let fp = Fingerprint::testing_from_raw("deadbeef");
        backend.put(&fp, b"large payload".to_vec()).await.unwrap();
        assert_eq!(backend.get(&fp).await.unwrap(), Some(b"large payload".to_vec()));
    }

    #[tokio::test]
    async fn in_memory_l2_miss_is_none() {
        let backend = InMemoryL2Backend::new();
        let fp = Fingerprint::testing_from_raw("missing");
        assert_eq!(backend.get(&fp).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fs_l2_round_trips_through_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsL2Backend::new(dir.path()).unwrap();
        let fp = Fingerprint::testing_from_raw("0011ff");
        backend.put(&fp, b"bytes on disk".to_vec()).await.unwrap();
        assert_eq!(backend.get(&fp).await.unwrap(), Some(b"bytes on disk".to_vec()));
        backend.delete(&fp).await.unwrap();
        assert_eq!(backend.get(&fp).await.unwrap(), None);
    }
}
