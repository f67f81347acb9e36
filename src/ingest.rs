//! Document ingestion pipeline.
//!
//! Reads UTF-8 text files, splits them into overlapping chunks, embeds
//! each chunk, and folds the result into the caller's session index.
//! With publishing enabled the session index is then merged into the
//! shared remote index and the raw document bytes are uploaded alongside
//! it for later re-processing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{EmbeddedVector, Metric, VectorIndex};
use crate::models::Chunk;
use crate::remote::{Precondition, RemoteStore};
use crate::session::SessionRegistry;
use crate::sync::Synchronizer;

/// Summary of a completed ingest run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub vectors_in_session: usize,
    pub published_vectors: Option<usize>,
}

/// Ingest `files` into the session owned by `session_id`.
///
/// When `publish` is set, the vectors embedded in this run are merged into
/// the shared store afterwards and each raw document is uploaded under
/// `documents/<name>`. Only this run's vectors are published; vectors from
/// earlier ingests were already merged remotely and re-submitting them
/// would duplicate entries in the shared index.
pub async fn ingest_files(
    config: &Config,
    registry: &SessionRegistry,
    store: &dyn RemoteStore,
    embedder: &dyn Embedder,
    session_id: Uuid,
    files: &[PathBuf],
    publish: bool,
) -> Result<IngestStats> {
    let metric = match config.retrieval.metric.as_str() {
        "l2" => Metric::L2,
        _ => Metric::Cosine,
    };

    let mut stats = IngestStats::default();
    let mut document_names = Vec::new();
    let mut publish_entries = Vec::new();

    for path in files {
        let name = document_name(path)?;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        if text.trim().is_empty() {
            tracing::warn!(document = %name, "skipping empty document");
            continue;
        }

        let pieces = chunk_text(&text, config.chunking.chunk_size, config.chunking.overlap)?;
        let entries = embed_chunks(embedder, config.embedding.batch_size, &pieces, &name).await?;

        stats.chunks += entries.len();
        if publish {
            publish_entries.extend(entries.iter().cloned());
        }
        stats.vectors_in_session = registry
            .ingest(session_id, metric, entries, &name)
            .await
            .with_context(|| format!("failed to index {}", name))?;
        stats.documents += 1;

        println!("  Indexed {} ({} chunks)", name, pieces.len());

        if publish {
            store
                .put(
                    &format!("documents/{}", name),
                    text.into_bytes(),
                    Precondition::None,
                )
                .await
                .with_context(|| format!("failed to upload raw document {}", name))?;
        }
        document_names.push(name);
    }

    if publish && !publish_entries.is_empty() {
        let new_index = VectorIndex::build(metric, publish_entries)?;
        stats.published_vectors = Some(publish_index(store, &new_index, &document_names).await?);
    }

    Ok(stats)
}

async fn embed_chunks(
    embedder: &dyn Embedder,
    batch_size: usize,
    pieces: &[String],
    document: &str,
) -> Result<Vec<EmbeddedVector>> {
    let mut entries = Vec::with_capacity(pieces.len());
    for batch in pieces.chunks(batch_size.max(1)) {
        let vectors = embedder
            .embed_batch(batch)
            .await
            .with_context(|| format!("failed to embed chunks of {}", document))?;
        for (text, vector) in batch.iter().zip(vectors) {
            entries.push(EmbeddedVector {
                vector,
                chunk: Chunk::new(text, document),
            });
        }
    }
    Ok(entries)
}

async fn publish_index(
    store: &dyn RemoteStore,
    local: &VectorIndex,
    document_names: &[String],
) -> Result<usize> {
    let sync = Synchronizer::new(store);
    let report = sync
        .publish(local, document_names)
        .await
        .context("failed to publish to shared index")?;
    println!(
        "  Published to shared index ({} vectors, {} documents in manifest)",
        report.shared_vectors,
        report.manifest_documents.len()
    );
    Ok(report.shared_vectors)
}

fn document_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .with_context(|| format!("invalid file name: {}", path.display()))
}
