//! Core data models used throughout ragpool.
//!
//! These types represent the chunks, search hits, and chat turns that flow
//! through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A bounded span of source text — the unit of retrieval.
///
/// Produced once by the chunker; immutable afterwards and owned by the
/// vector index that embeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Name of the document this chunk was cut from.
    pub source_document: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_document: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_document: source_document.into(),
        }
    }
}

/// A single nearest-neighbor result returned from index search.
///
/// For cosine indexes `score` is the similarity (higher is better); for L2
/// indexes it is the distance (lower is better). Hits are always ordered
/// best-first, so callers need not interpret the metric.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// One turn of the chat log (`role` is `"user"` or `"assistant"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    /// Wall-clock time of the turn, formatted `HH:MM:SS`.
    pub timestamp: String,
}
