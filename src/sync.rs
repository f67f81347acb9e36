//! Shared index synchronization.
//!
//! Publishing a session's local index to the shared store is a
//! read-merge-write cycle: fetch the current shared blob, merge the local
//! index into it, and write the result back conditionally on the version
//! that was read. A concurrent publisher invalidates the version and the
//! cycle restarts from the fetch, so no published vectors are ever lost to
//! a racing writer. The processed-documents manifest follows the same
//! cycle.

use crate::error::{RemoteError, SyncError};
use crate::index::VectorIndex;
use crate::remote::{Precondition, RemoteStore, MANIFEST_KEY, SHARED_INDEX_KEY};

/// How many times a publish retries after losing a conditional write
/// before giving up with [`SyncError::Contended`].
const MAX_PUBLISH_ATTEMPTS: u32 = 5;

/// Outcome of a successful publish.
#[derive(Debug)]
pub struct PublishReport {
    /// Total vectors in the shared index after the merge.
    pub shared_vectors: usize,
    /// Documents listed in the manifest after the merge.
    pub manifest_documents: Vec<String>,
}

/// Merges local indexes into the shared remote index.
pub struct Synchronizer<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    /// Merge `local` into the shared index and record `document_names` in
    /// the processed-documents manifest.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Contended`] when the conditional write keeps losing
    ///   to concurrent publishers after several attempts.
    /// - [`SyncError::Index`] when the shared blob is incompatible with
    ///   the local index or corrupt.
    /// - [`SyncError::Remote`] on transport failures.
    pub async fn publish(
        &self,
        local: &VectorIndex,
        document_names: &[String],
    ) -> Result<PublishReport, SyncError> {
        let shared_vectors = self.publish_index(local).await?;
        let manifest_documents = self.publish_manifest(document_names).await?;
        tracing::info!(
            shared_vectors,
            manifest_len = manifest_documents.len(),
            "published local index to shared store"
        );
        Ok(PublishReport {
            shared_vectors,
            manifest_documents,
        })
    }

    async fn publish_index(&self, local: &VectorIndex) -> Result<usize, SyncError> {
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            let (merged, precondition) = match self.store.get(SHARED_INDEX_KEY).await? {
                Some(object) => {
                    let shared = VectorIndex::from_bytes(&object.bytes)?;
                    (shared.merge(local)?, Precondition::IfVersion(object.version))
                }
                None => (local.clone(), Precondition::IfAbsent),
            };

            match self
                .store
                .put(SHARED_INDEX_KEY, merged.to_bytes(), precondition)
                .await
            {
                Ok(_) => return Ok(merged.len()),
                Err(RemoteError::PreconditionFailed) => {
                    tracing::debug!(attempt, "shared index changed underneath us, retrying merge");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SyncError::Contended {
            attempts: MAX_PUBLISH_ATTEMPTS,
        })
    }

    async fn publish_manifest(&self, document_names: &[String]) -> Result<Vec<String>, SyncError> {
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            let (mut manifest, precondition) = match self.store.get(MANIFEST_KEY).await? {
                Some(object) => {
                    let names: Vec<String> = serde_json::from_slice(&object.bytes)
                        .map_err(|e| SyncError::BadManifest(e.to_string()))?;
                    (names, Precondition::IfVersion(object.version))
                }
                None => (Vec::new(), Precondition::IfAbsent),
            };

            for name in document_names {
                if !manifest.contains(name) {
                    manifest.push(name.clone());
                }
            }

            let bytes = serde_json::to_vec_pretty(&manifest)
                .map_err(|e| SyncError::BadManifest(e.to_string()))?;

            match self.store.put(MANIFEST_KEY, bytes, precondition).await {
                Ok(_) => return Ok(manifest),
                Err(RemoteError::PreconditionFailed) => {
                    tracing::debug!(attempt, "manifest changed underneath us, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SyncError::Contended {
            attempts: MAX_PUBLISH_ATTEMPTS,
        })
    }

    /// Fetch the shared index, or `None` when nothing has been published.
    pub async fn fetch_shared(&self) -> Result<Option<VectorIndex>, SyncError> {
        match self.store.get(SHARED_INDEX_KEY).await? {
            Some(object) => Ok(Some(VectorIndex::from_bytes(&object.bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch the processed-documents manifest, empty when absent.
    pub async fn fetch_manifest(&self) -> Result<Vec<String>, SyncError> {
        match self.store.get(MANIFEST_KEY).await? {
            Some(object) => {
                serde_json::from_slice(&object.bytes).map_err(|e| SyncError::BadManifest(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}
