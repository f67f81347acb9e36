//! Query routing.
//!
//! A query names a mode: `local` searches the caller's session index,
//! `shared` searches the published shared index. Either way the pipeline
//! is the same: embed the question, search the chosen index, answer over
//! the top hits, and append the exchange to the chat log.
//!
//! Routing never panics and never leaks raw errors to the caller. Every
//! failure path resolves to a user-facing message; operational detail goes
//! to the log instead.

use uuid::Uuid;

use crate::answer::Answerer;
use crate::chatlog::ChatLog;
use crate::embedding::Embedder;
use crate::error::SyncError;
use crate::index::VectorIndex;
use crate::models::Chunk;
use crate::remote::RemoteStore;
use crate::session::SessionRegistry;
use crate::sync::Synchronizer;

/// Which index a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// The caller's session-scoped index.
    Local,
    /// The shared index published by all sessions.
    Shared,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Local => "local",
            QueryMode::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(QueryMode::Local),
            "shared" => Some(QueryMode::Shared),
            _ => None,
        }
    }
}

const NO_LOCAL_DOCUMENTS: &str =
    "You haven't uploaded any documents in this session yet. Ingest a document first, \
     then ask again.";
const NO_SHARED_DOCUMENTS: &str =
    "No documents have been published to the shared index yet. Ingest with --publish \
     to make documents available to everyone.";
const REMOTE_UNAVAILABLE: &str =
    "The shared index is temporarily unreachable. Please try again in a moment.";
const SHARED_INDEX_DAMAGED: &str =
    "The shared index appears to be damaged and needs to be republished.";
const ANSWER_UNAVAILABLE: &str =
    "I found relevant passages but couldn't generate an answer right now. Please try again.";
const EMBED_UNAVAILABLE: &str =
    "I couldn't process your question right now. Please try again.";
const INDEX_MISMATCH: &str =
    "The index was built with a different embedding model than the one configured. \
     Re-ingest the documents with the current model.";

pub struct QueryRouter<'a> {
    registry: &'a SessionRegistry,
    store: &'a dyn RemoteStore,
    embedder: &'a dyn Embedder,
    answerer: &'a dyn Answerer,
    chat_log: &'a ChatLog,
    top_k: usize,
}

impl<'a> QueryRouter<'a> {
    pub fn new(
        registry: &'a SessionRegistry,
        store: &'a dyn RemoteStore,
        embedder: &'a dyn Embedder,
        answerer: &'a dyn Answerer,
        chat_log: &'a ChatLog,
        top_k: usize,
    ) -> Self {
        Self {
            registry,
            store,
            embedder,
            answerer,
            chat_log,
            top_k,
        }
    }

    /// Answer a question against the index named by `mode`.
    ///
    /// Always returns a message suitable for showing to the user. The
    /// exchange is appended to the chat log; a logging failure is reported
    /// to the operational log but does not affect the returned answer.
    pub async fn route(&self, mode: QueryMode, session_id: Uuid, question: &str) -> String {
        let answer = self.answer_question(mode, session_id, question).await;
        if let Err(e) = self.chat_log.append(mode, question, &answer).await {
            tracing::warn!(error = %e, "failed to append chat history");
        }
        answer
    }

    async fn answer_question(&self, mode: QueryMode, session_id: Uuid, question: &str) -> String {
        let index = match self.resolve_index(mode, session_id).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                return match mode {
                    QueryMode::Local => NO_LOCAL_DOCUMENTS.to_string(),
                    QueryMode::Shared => NO_SHARED_DOCUMENTS.to_string(),
                }
            }
            Err(message) => return message,
        };

        let query_vector = match self.embedder.embed_query(question).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::error!(error = %e, "failed to embed query");
                return EMBED_UNAVAILABLE.to_string();
            }
        };

        let hits = match index.search(&query_vector, self.top_k) {
            Ok(hits) => hits,
            Err(e) => {
                // Contract violation, not a transient failure: the query
                // embedder and the index disagree on dimensions.
                tracing::error!(error = %e, "query incompatible with index");
                return INDEX_MISMATCH.to_string();
            }
        };

        let context: Vec<Chunk> = hits.into_iter().map(|hit| hit.chunk).collect();
        match self.answerer.answer(&context, question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "answer generation failed");
                ANSWER_UNAVAILABLE.to_string()
            }
        }
    }

    async fn resolve_index(
        &self,
        mode: QueryMode,
        session_id: Uuid,
    ) -> Result<Option<VectorIndex>, String> {
        match mode {
            QueryMode::Local => match self.registry.get_local_index(session_id).await {
                Ok(index) => Ok(index),
                Err(e) => {
                    tracing::error!(%session_id, error = %e, "failed to load session index");
                    Err(EMBED_UNAVAILABLE.to_string())
                }
            },
            QueryMode::Shared => {
                let sync = Synchronizer::new(self.store);
                match sync.fetch_shared().await {
                    Ok(index) => Ok(index),
                    Err(SyncError::Index(e)) => {
                        tracing::error!(error = %e, "shared index blob is corrupt");
                        Err(SHARED_INDEX_DAMAGED.to_string())
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to fetch shared index");
                        Err(REMOTE_UNAVAILABLE.to_string())
                    }
                }
            }
        }
    }
}
