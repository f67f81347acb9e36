//! Remote blob-store abstraction.
//!
//! The synchronizer needs exactly three operations against durable storage:
//! existence check, get, and put of opaque byte blobs under string keys.
//! `put` is versioned: every stored object carries an opaque version tag
//! (an ETag, a content hash — whatever the backend has), and writers can
//! make a put conditional on the version they read. That conditional write
//! is what turns the download-merge-upload cycle into an optimistic
//! compare-and-swap instead of a lost-update race.
//!
//! Backends:
//! - [`FsRemoteStore`] — a directory on local disk, for dev and
//!   single-host deployments (version = content SHA-256).
//! - [`MemoryRemoteStore`] — in-process map with true CAS, used by tests.
//! - `S3RemoteStore` (in [`crate::remote_s3`]) — S3-compatible object
//!   storage over the REST API.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::RemoteError;

/// Key of the shared merged index blob.
pub const SHARED_INDEX_KEY: &str = "index/shared.idx";
/// Key of the shared manifest (JSON array of ingested document names).
pub const MANIFEST_KEY: &str = "index/manifest.json";

/// A fetched object: its bytes plus the version tag they were read at.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub bytes: Vec<u8>,
    pub version: String,
}

/// Condition attached to a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional create-or-overwrite.
    None,
    /// Succeed only if the key does not exist yet.
    IfAbsent,
    /// Succeed only if the key's current version matches.
    IfVersion(String),
}

/// Durable blob storage addressed by string keys.
///
/// `get` returns only fully written blobs — a reader never observes a
/// partial object. There is no multi-key transaction; callers treating two
/// keys as a unit must accept the gap between the two puts.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, RemoteError>;

    /// Fetch a blob; `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<RemoteObject>, RemoteError>;

    /// Store a blob, returning the new version tag.
    ///
    /// # Errors
    ///
    /// [`RemoteError::PreconditionFailed`] when the condition does not hold;
    /// [`RemoteError::Unavailable`] / [`RemoteError::Status`] for transport
    /// failures.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Precondition,
    ) -> Result<String, RemoteError>;
}

fn content_version(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ============ Filesystem backend ============

/// Directory-backed store for local and single-host use.
///
/// Keys map to files under the root (slashes become subdirectories). The
/// version tag is the SHA-256 of the content; the conditional check reads
/// the current file before writing, which is race-free only within one
/// process — multi-writer deployments should use the S3 backend.
pub struct FsRemoteStore {
    root: PathBuf,
    // Serializes check-then-write so the precondition holds in-process.
    write_lock: tokio::sync::Mutex<()>,
}

impl FsRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl RemoteStore for FsRemoteStore {
    async fn exists(&self, key: &str) -> Result<bool, RemoteError> {
        Ok(self.path_for(key).exists())
    }

    async fn get(&self, key: &str) -> Result<Option<RemoteObject>, RemoteError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let version = content_version(&bytes);
                Ok(Some(RemoteObject { bytes, version }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::Unavailable(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Precondition,
    ) -> Result<String, RemoteError> {
        let _guard = self.write_lock.lock().await;

        let current = self.get(key).await?;
        match (&expected, &current) {
            (Precondition::None, _) => {}
            (Precondition::IfAbsent, None) => {}
            (Precondition::IfAbsent, Some(_)) => return Err(RemoteError::PreconditionFailed),
            (Precondition::IfVersion(v), Some(obj)) if *v == obj.version => {}
            (Precondition::IfVersion(_), _) => return Err(RemoteError::PreconditionFailed),
        }

        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RemoteError::Unavailable(format!("mkdir: {}", e)))?;
        }

        // Write-then-rename so readers never see a partial blob.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("rename {}: {}", path.display(), e)))?;

        Ok(content_version(&bytes))
    }
}

// ============ In-memory backend ============

/// In-process store with genuine compare-and-swap, for tests and ephemeral
/// setups. Versions are monotonically increasing counters.
#[derive(Default)]
pub struct MemoryRemoteStore {
    objects: RwLock<HashMap<String, (Vec<u8>, u64)>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn exists(&self, key: &str) -> Result<bool, RemoteError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<RemoteObject>, RemoteError> {
        Ok(self.objects.read().await.get(key).map(|(bytes, v)| RemoteObject {
            bytes: bytes.clone(),
            version: v.to_string(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Precondition,
    ) -> Result<String, RemoteError> {
        let mut objects = self.objects.write().await;
        let current = objects.get(key).map(|(_, v)| *v);

        match (&expected, current) {
            (Precondition::None, _) => {}
            (Precondition::IfAbsent, None) => {}
            (Precondition::IfAbsent, Some(_)) => return Err(RemoteError::PreconditionFailed),
            (Precondition::IfVersion(v), Some(cur)) if *v == cur.to_string() => {}
            (Precondition::IfVersion(_), _) => return Err(RemoteError::PreconditionFailed),
        }

        let next = current.unwrap_or(0) + 1;
        objects.insert(key.to_string(), (bytes, next));
        Ok(next.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_basic_roundtrip() {
        let store = MemoryRemoteStore::new();
        assert!(!store.exists("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());

        let v1 = store.put("k", b"one".to_vec(), Precondition::IfAbsent).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        let obj = store.get("k").await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"one");
        assert_eq!(obj.version, v1);
    }

    #[tokio::test]
    async fn test_memory_cas_rejects_stale_version() {
        let store = MemoryRemoteStore::new();
        let v1 = store.put("k", b"one".to_vec(), Precondition::None).await.unwrap();
        store.put("k", b"two".to_vec(), Precondition::IfVersion(v1.clone())).await.unwrap();

        // v1 is now stale.
        let err = store
            .put("k", b"three".to_vec(), Precondition::IfVersion(v1))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PreconditionFailed));
        assert_eq!(store.get("k").await.unwrap().unwrap().bytes, b"two");
    }

    #[tokio::test]
    async fn test_memory_if_absent_rejects_existing() {
        let store = MemoryRemoteStore::new();
        store.put("k", b"one".to_vec(), Precondition::None).await.unwrap();
        let err = store
            .put("k", b"two".to_vec(), Precondition::IfAbsent)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PreconditionFailed));
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_cas() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRemoteStore::new(dir.path());

        assert!(store.get(SHARED_INDEX_KEY).await.unwrap().is_none());
        let v1 = store
            .put(SHARED_INDEX_KEY, b"blob".to_vec(), Precondition::IfAbsent)
            .await
            .unwrap();

        let obj = store.get(SHARED_INDEX_KEY).await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"blob");
        assert_eq!(obj.version, v1);

        // Matching version succeeds, stale version fails.
        store
            .put(SHARED_INDEX_KEY, b"blob2".to_vec(), Precondition::IfVersion(v1.clone()))
            .await
            .unwrap();
        let err = store
            .put(SHARED_INDEX_KEY, b"blob3".to_vec(), Precondition::IfVersion(v1))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PreconditionFailed));
    }
}
