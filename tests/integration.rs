use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

use async_trait::async_trait;
use ragpool::answer::{Answerer, DisabledAnswerer};
use ragpool::chatlog::ChatLog;
use ragpool::embedding::Embedder;
use ragpool::error::{AnswerError, EmbedError};
use ragpool::index::{EmbeddedVector, Metric};
use ragpool::models::Chunk;
use ragpool::query::{QueryMode, QueryRouter};
use ragpool::remote::{FsRemoteStore, MemoryRemoteStore, RemoteStore};
use ragpool::session::SessionRegistry;
use ragpool::sync::Synchronizer;
use uuid::Uuid;

// ---------- CLI tests ----------

fn ragpool_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragpool");
    path
}

fn setup_cli_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[sessions]
persist_dir = "{root}/data/sessions"

[chat]
dir = "{root}/data/chat"

[remote]
backend = "fs"

[remote.fs]
root = "{root}/data/remote"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("ragpool.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

#[test]
fn test_cli_session_prints_uuid() {
    let (_tmp, config) = setup_cli_env();
    let output = Command::new(ragpool_binary())
        .args(["session", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    Uuid::parse_str(stdout.trim()).expect("session command should print a UUID");
}

#[test]
fn test_cli_manifest_on_empty_store() {
    let (_tmp, config) = setup_cli_env();
    let output = Command::new(ragpool_binary())
        .args(["manifest", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("No documents have been published"));
}

#[test]
fn test_cli_history_empty_and_clear() {
    let (_tmp, config) = setup_cli_env();

    let output = Command::new(ragpool_binary())
        .args(["history", "--mode", "local", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("No chat history"));

    let output = Command::new(ragpool_binary())
        .args(["clear-history", "--mode", "shared", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(output.status.success());
}

#[test]
fn test_cli_rejects_invalid_mode() {
    let (_tmp, config) = setup_cli_env();
    let session = Uuid::new_v4().to_string();
    let output = Command::new(ragpool_binary())
        .args(["query", "hello", "--mode", "global", "--session", &session, "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(!output.status.success());
}

#[test]
fn test_cli_shared_query_needs_no_session() {
    let (_tmp, config) = setup_cli_env();
    let output = Command::new(ragpool_binary())
        .args(["query", "hello", "--mode", "shared", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("No documents have been published"));
}

#[test]
fn test_cli_local_query_requires_session() {
    let (_tmp, config) = setup_cli_env();
    let output = Command::new(ragpool_binary())
        .args(["query", "hello", "--mode", "local", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run ragpool");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--session"));
}

#[test]
fn test_cli_rejects_missing_config() {
    let output = Command::new(ragpool_binary())
        .args(["session", "--config", "/nonexistent/ragpool.toml"])
        .output()
        .expect("failed to run ragpool");
    assert!(!output.status.success());
}

// ---------- Pipeline tests ----------

/// Deterministic bag-of-words embedder. Each word hashes to a dimension,
/// so semantically overlapping sentences share dimensions without any
/// network or model files.
struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text.to_lowercase().split_whitespace() {
            let mut h: usize = 5381;
            for b in word.bytes() {
                h = h.wrapping_mul(33).wrapping_add(b as usize);
            }
            vector[h % self.dims] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Answerer that wraps retrieved passages so tests can check which
/// context made it through the pipeline.
struct EchoAnswerer;

#[async_trait]
impl Answerer for EchoAnswerer {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn answer(&self, context: &[Chunk], question: &str) -> Result<String, AnswerError> {
        let sources: Vec<&str> = context.iter().map(|c| c.source_document.as_str()).collect();
        Ok(format!("Q: {} | sources: {}", question, sources.join(",")))
    }
}

async fn ingest_sentences(
    registry: &SessionRegistry,
    embedder: &HashEmbedder,
    session_id: Uuid,
    sentences: &[&str],
    doc: &str,
) {
    let texts: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();
    let entries: Vec<EmbeddedVector> = texts
        .into_iter()
        .zip(vectors)
        .map(|(text, vector)| EmbeddedVector {
            vector,
            chunk: Chunk::new(&text, doc),
        })
        .collect();
    registry
        .ingest(session_id, Metric::Cosine, entries, doc)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_two_sessions_publish_and_share() {
    let session_dir = TempDir::new().unwrap();
    let chat_dir = TempDir::new().unwrap();
    let registry = SessionRegistry::new(session_dir.path(), 86400);
    let store = MemoryRemoteStore::new();
    let embedder = HashEmbedder { dims: 128 };
    let chat_log = ChatLog::new(chat_dir.path());

    let alice = registry.start_session().await.unwrap();
    let bob = registry.start_session().await.unwrap();

    ingest_sentences(
        &registry,
        &embedder,
        alice,
        &["aspirin relieves headache and fever"],
        "pharma.txt",
    )
    .await;
    ingest_sentences(
        &registry,
        &embedder,
        bob,
        &["the deployment runbook covers rollback steps"],
        "runbook.txt",
    )
    .await;

    // Each session publishes its own index.
    let sync = Synchronizer::new(&store);
    let alice_index = registry.get_local_index(alice).await.unwrap().unwrap();
    sync.publish(&alice_index, &["pharma.txt".to_string()])
        .await
        .unwrap();
    let bob_index = registry.get_local_index(bob).await.unwrap().unwrap();
    let report = sync
        .publish(&bob_index, &["runbook.txt".to_string()])
        .await
        .unwrap();

    assert_eq!(report.shared_vectors, 2);
    assert_eq!(
        report.manifest_documents,
        vec!["pharma.txt".to_string(), "runbook.txt".to_string()]
    );

    // Local mode sees only the querying session's documents.
    let router = QueryRouter::new(&registry, &store, &embedder, &EchoAnswerer, &chat_log, 1);
    let local = router
        .route(QueryMode::Local, alice, "what relieves headache")
        .await;
    assert!(local.contains("pharma.txt"));
    assert!(!local.contains("runbook.txt"));

    // Shared mode sees documents from both sessions.
    let shared = router
        .route(QueryMode::Shared, alice, "rollback steps in the runbook")
        .await;
    assert!(shared.contains("runbook.txt"));
}

#[tokio::test]
async fn test_shared_query_before_any_publish() {
    let session_dir = TempDir::new().unwrap();
    let chat_dir = TempDir::new().unwrap();
    let registry = SessionRegistry::new(session_dir.path(), 86400);
    let store = MemoryRemoteStore::new();
    let embedder = HashEmbedder { dims: 64 };
    let chat_log = ChatLog::new(chat_dir.path());

    let sid = registry.start_session().await.unwrap();
    ingest_sentences(&registry, &embedder, sid, &["private notes"], "notes.txt").await;

    // Ingesting without publishing leaves the shared index empty.
    let router = QueryRouter::new(&registry, &store, &embedder, &EchoAnswerer, &chat_log, 4);
    let answer = router.route(QueryMode::Shared, sid, "anything").await;
    assert!(answer.contains("No documents have been published"));
}

#[tokio::test]
async fn test_fs_store_end_to_end_publish() {
    let session_dir = TempDir::new().unwrap();
    let remote_dir = TempDir::new().unwrap();
    let registry = SessionRegistry::new(session_dir.path(), 86400);
    let store = FsRemoteStore::new(remote_dir.path());
    let embedder = HashEmbedder { dims: 32 };

    let sid = registry.start_session().await.unwrap();
    ingest_sentences(&registry, &embedder, sid, &["shared fact"], "fact.txt").await;

    let sync = Synchronizer::new(&store);
    let index = registry.get_local_index(sid).await.unwrap().unwrap();
    sync.publish(&index, &["fact.txt".to_string()]).await.unwrap();

    // A second synchronizer over the same directory sees the publish.
    let other = FsRemoteStore::new(remote_dir.path());
    let sync2 = Synchronizer::new(&other);
    let shared = sync2.fetch_shared().await.unwrap().unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(sync2.fetch_manifest().await.unwrap(), vec!["fact.txt".to_string()]);
}

#[tokio::test]
async fn test_query_survives_every_empty_state() {
    let session_dir = TempDir::new().unwrap();
    let chat_dir = TempDir::new().unwrap();
    let registry = SessionRegistry::new(session_dir.path(), 86400);
    let store = MemoryRemoteStore::new();
    let embedder = HashEmbedder { dims: 16 };
    let chat_log = ChatLog::new(chat_dir.path());
    let router = QueryRouter::new(
        &registry,
        &store,
        &embedder,
        &DisabledAnswerer,
        &chat_log,
        4,
    );

    // Never-seen session id, no documents anywhere. Both modes must
    // come back with a message rather than an error.
    let ghost = Uuid::new_v4();
    let local = router.route(QueryMode::Local, ghost, "hello").await;
    assert!(local.contains("haven't uploaded any documents"));
    let shared = router.route(QueryMode::Shared, ghost, "hello").await;
    assert!(shared.contains("No documents have been published"));
}

#[tokio::test]
async fn test_session_index_survives_registry_restart() {
    let session_dir = TempDir::new().unwrap();
    let embedder = HashEmbedder { dims: 32 };

    let sid;
    {
        let registry = SessionRegistry::new(session_dir.path(), 86400);
        sid = registry.start_session().await.unwrap();
        ingest_sentences(&registry, &embedder, sid, &["durable fact"], "fact.txt").await;
    }

    let registry = SessionRegistry::new(session_dir.path(), 86400);
    let index = registry.get_local_index(sid).await.unwrap().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.source_documents(), vec!["fact.txt".to_string()]);
}

#[tokio::test]
async fn test_raw_document_uploaded_next_to_index() {
    let remote_dir = TempDir::new().unwrap();
    let store = FsRemoteStore::new(remote_dir.path());

    store
        .put(
            "documents/notes.txt",
            b"raw body".to_vec(),
            ragpool::remote::Precondition::None,
        )
        .await
        .unwrap();

    let object = store.get("documents/notes.txt").await.unwrap().unwrap();
    assert_eq!(object.bytes, b"raw body");
}
