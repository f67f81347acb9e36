//! Session-scoped local indexes.
//!
//! Each browsing session gets its own private [`VectorIndex`], held in
//! memory and mirrored to disk so a restart does not lose it. Sessions are
//! identified by a UUID handed to the client at creation time; an unknown
//! session id presented later is treated as a fresh session rather than an
//! error, so expired or restarted clients degrade gracefully.
//!
//! Sessions idle longer than the configured TTL are evicted, together with
//! their persisted blob, during the sweep that runs on every
//! [`SessionRegistry::start_session`] call.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::IndexError;
use crate::index::{EmbeddedVector, Metric, VectorIndex};

/// Per-session state. Guarded by its own mutex so long-running ingests on
/// one session never block lookups on another.
pub struct SessionRecord {
    pub session_id: Uuid,
    pub index: Option<VectorIndex>,
    pub ingested_documents: BTreeSet<String>,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

impl SessionRecord {
    fn new(session_id: Uuid) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            index: None,
            ingested_documents: BTreeSet::new(),
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Registry of live sessions and their local indexes.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionRecord>>>>,
    persist_dir: PathBuf,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(persist_dir: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            persist_dir: persist_dir.into(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    fn blob_path(&self, session_id: Uuid) -> PathBuf {
        self.persist_dir.join(format!("{}.idx", session_id))
    }

    /// Create a new session and return its id.
    ///
    /// Also sweeps out sessions idle past the TTL, deleting their persisted
    /// blobs.
    pub async fn start_session(&self) -> Result<Uuid> {
        self.evict_stale().await;

        let session_id = Uuid::new_v4();
        let record = Arc::new(Mutex::new(SessionRecord::new(session_id)));
        self.sessions.write().await.insert(session_id, record);
        tracing::info!(%session_id, "session started");
        Ok(session_id)
    }

    async fn evict_stale(&self) {
        let mut candidates = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, record) in sessions.iter() {
                let record = record.lock().await;
                if record.last_activity_at.elapsed() > self.ttl {
                    candidates.push(*id);
                }
            }
        }
        for id in candidates {
            self.remove_if_stale(id).await;
        }
    }

    /// Remove a session only if it is still past the TTL. The re-check
    /// runs under the write lock: a session touched between the sweep's
    /// collection phase and this call stays alive.
    async fn remove_if_stale(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get(&id) else {
            return;
        };
        if record.lock().await.last_activity_at.elapsed() <= self.ttl {
            return;
        }
        sessions.remove(&id);

        let path = self.blob_path(id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%id, error = %e, "failed to remove persisted session index");
            }
        }
        tracing::info!(session_id = %id, "session evicted after idle timeout");
    }

    /// Fetch the record for a session, creating one if the id is unknown.
    ///
    /// Unknown ids occur when a session expired server-side or the process
    /// restarted without its persisted blobs. Treating them as fresh
    /// sessions keeps old clients functional.
    async fn get_or_create(&self, session_id: Uuid) -> Arc<Mutex<SessionRecord>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(record) = sessions.get(&session_id) {
                return Arc::clone(record);
            }
        }

        let mut sessions = self.sessions.write().await;
        // Double-check under the write lock; another task may have won.
        if let Some(record) = sessions.get(&session_id) {
            return Arc::clone(record);
        }
        tracing::warn!(%session_id, "unknown session id, creating fresh session");
        let record = Arc::new(Mutex::new(SessionRecord::new(session_id)));
        sessions.insert(session_id, Arc::clone(&record));
        record
    }

    /// Add embedded chunks from `document_name` to the session's local
    /// index, building it on first ingest and merging on subsequent ones.
    ///
    /// The updated index is persisted to disk before returning, so the
    /// session survives a process restart.
    pub async fn ingest(
        &self,
        session_id: Uuid,
        metric: Metric,
        entries: Vec<EmbeddedVector>,
        document_name: &str,
    ) -> Result<usize> {
        let incoming = VectorIndex::build(metric, entries)?;
        let record = self.get_or_create(session_id).await;
        let mut record = record.lock().await;

        // Merge and persist before touching the record, so a failure
        // leaves the previous index intact.
        let merged = match record.index.as_ref() {
            Some(existing) => existing.merge(&incoming)?,
            None => incoming,
        };
        let total = merged.len();
        self.persist(session_id, &merged)
            .await
            .with_context(|| format!("failed to persist index for session {}", session_id))?;

        record.ingested_documents.insert(document_name.to_string());
        record.index = Some(merged);
        record.last_activity_at = Instant::now();
        tracing::info!(
            %session_id,
            document = document_name,
            total_vectors = total,
            "ingested document into session index"
        );
        Ok(total)
    }

    async fn persist(&self, session_id: Uuid, index: &VectorIndex) -> Result<()> {
        tokio::fs::create_dir_all(&self.persist_dir)
            .await
            .with_context(|| format!("failed to create {}", self.persist_dir.display()))?;
        let path = self.blob_path(session_id);
        let tmp = path.with_extension("idx.tmp");
        tokio::fs::write(&tmp, index.to_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to rename {} into place", tmp.display()))?;
        Ok(())
    }

    /// Return a clone of the session's local index, falling back to the
    /// persisted blob when the in-memory record is empty (e.g. after a
    /// restart). Returns `None` when the session has no ingested documents.
    pub async fn get_local_index(&self, session_id: Uuid) -> Result<Option<VectorIndex>> {
        let record = self.get_or_create(session_id).await;
        let mut record = record.lock().await;
        record.last_activity_at = Instant::now();

        if let Some(ref index) = record.index {
            return Ok(Some(index.clone()));
        }

        match load_index(&self.blob_path(session_id)).await? {
            Some(index) => {
                for doc in index.source_documents() {
                    record.ingested_documents.insert(doc);
                }
                record.index = Some(index.clone());
                tracing::info!(%session_id, "restored session index from disk");
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    /// Names of the documents ingested into this session, sorted.
    pub async fn ingested_documents(&self, session_id: Uuid) -> Vec<String> {
        let record = self.get_or_create(session_id).await;
        let record = record.lock().await;
        record.ingested_documents.iter().cloned().collect()
    }
}

async fn load_index(path: &Path) -> Result<Option<VectorIndex>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    match VectorIndex::from_bytes(&bytes) {
        Ok(index) => Ok(Some(index)),
        Err(IndexError::Corrupt(reason)) => {
            // A damaged blob should not wedge the session forever.
            tracing::warn!(path = %path.display(), reason, "discarding corrupt session index");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to decode {}", path.display())),
    }
}
