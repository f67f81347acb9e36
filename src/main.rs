//! # Ragpool CLI (`ragpool`)
//!
//! Command-line interface for the session-aware retrieval pipeline.
//!
//! ## Usage
//!
//! ```bash
//! ragpool --config ./config/ragpool.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragpool session` | Create a new session and print its id |
//! | `ragpool ingest <files>` | Ingest documents into a session index |
//! | `ragpool query "<question>"` | Ask a question against an index |
//! | `ragpool manifest` | List documents published to the shared index |
//! | `ragpool history` | Print today's chat history for a mode |
//! | `ragpool clear-history` | Delete today's chat history for a mode |
//!
//! ## Examples
//!
//! ```bash
//! # Mint a session id
//! ragpool session
//!
//! # Ingest privately into that session
//! ragpool ingest notes.txt --session 4f1c... --config ./config/ragpool.toml
//!
//! # Ingest and publish to the shared index
//! ragpool ingest report.txt --session 4f1c... --publish
//!
//! # Query the session's own documents
//! ragpool query "what changed?" --mode local --session 4f1c...
//!
//! # Query everything published by any session
//! ragpool query "what changed?" --mode shared --session 4f1c...
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use ragpool::answer::create_answerer;
use ragpool::chatlog::ChatLog;
use ragpool::config::{self, Config};
use ragpool::embedding::create_embedder;
use ragpool::ingest::ingest_files;
use ragpool::query::{QueryMode, QueryRouter};
use ragpool::remote::{FsRemoteStore, RemoteStore};
use ragpool::remote_s3::S3RemoteStore;
use ragpool::session::SessionRegistry;
use ragpool::sync::Synchronizer;

/// Ragpool — session-aware document retrieval with a shared vector index.
#[derive(Parser)]
#[command(
    name = "ragpool",
    about = "Session-aware document retrieval with a shared vector index",
    version,
    long_about = "Ragpool ingests text documents into per-session vector indexes, optionally \
    publishes them to a shared index in an object store, and answers questions grounded in \
    the retrieved chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragpool.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a new session and print its id.
    ///
    /// Pass the printed id to `ingest` and `query`. Sessions idle longer
    /// than `sessions.ttl_secs` are evicted together with their index.
    Session,

    /// Ingest documents into a session index.
    ///
    /// Reads each file as UTF-8 text, chunks it with overlap, embeds the
    /// chunks, and merges them into the session's index. With `--publish`
    /// the session index is also merged into the shared remote index and
    /// the raw documents are uploaded.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Session id from `ragpool session`.
        #[arg(long)]
        session: Uuid,

        /// Also merge into the shared index and record the documents in
        /// the manifest.
        #[arg(long)]
        publish: bool,
    },

    /// Ask a question against an index.
    Query {
        /// The question to answer.
        question: String,

        /// Which index to search: `local` (this session only) or `shared`
        /// (everything published by any session).
        #[arg(long, default_value = "local")]
        mode: String,

        /// Session id from `ragpool session`. Required for local mode;
        /// shared mode searches the published index and needs none.
        #[arg(long)]
        session: Option<Uuid>,
    },

    /// List documents published to the shared index.
    Manifest,

    /// Print today's chat history for a mode, newest exchange first.
    History {
        /// Chat mode: `local` or `shared`.
        #[arg(long, default_value = "local")]
        mode: String,
    },

    /// Delete today's chat history for a mode.
    ClearHistory {
        /// Chat mode: `local` or `shared`.
        #[arg(long, default_value = "local")]
        mode: String,
    },
}

fn create_store(config: &Config) -> anyhow::Result<Box<dyn RemoteStore>> {
    match config.remote.backend.as_str() {
        "s3" => {
            let s3 = config
                .remote
                .s3
                .clone()
                .ok_or_else(|| anyhow::anyhow!("[remote.s3] section missing"))?;
            Ok(Box::new(S3RemoteStore::new(s3)?))
        }
        "fs" => {
            let fs = config
                .remote
                .fs
                .clone()
                .ok_or_else(|| anyhow::anyhow!("[remote.fs] section missing"))?;
            Ok(Box::new(FsRemoteStore::new(fs.root)))
        }
        other => anyhow::bail!("unknown remote backend: {}", other),
    }
}

fn parse_mode(s: &str) -> anyhow::Result<QueryMode> {
    QueryMode::parse(s)
        .ok_or_else(|| anyhow::anyhow!("invalid mode '{}' (expected 'local' or 'shared')", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragpool=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    let registry = SessionRegistry::new(
        config.sessions.persist_dir.clone(),
        config.sessions.ttl_secs,
    );
    let chat_log = ChatLog::new(config.chat.dir.clone());

    match cli.command {
        Commands::Session => {
            let session_id = registry.start_session().await?;
            println!("{}", session_id);
        }

        Commands::Ingest {
            files,
            session,
            publish,
        } => {
            let store = create_store(&config)?;
            let embedder = create_embedder(&config.embedding)?;
            println!("Ingesting {} file(s) into session {}", files.len(), session);
            let stats = ingest_files(
                &config,
                &registry,
                store.as_ref(),
                embedder.as_ref(),
                session,
                &files,
                publish,
            )
            .await?;
            println!(
                "Done: {} document(s), {} chunk(s), {} vector(s) in session index",
                stats.documents, stats.chunks, stats.vectors_in_session
            );
        }

        Commands::Query {
            question,
            mode,
            session,
        } => {
            let mode = parse_mode(&mode)?;
            let session = match (mode, session) {
                (_, Some(id)) => id,
                (QueryMode::Shared, None) => Uuid::new_v4(),
                (QueryMode::Local, None) => {
                    anyhow::bail!("--session is required for --mode local")
                }
            };
            let store = create_store(&config)?;
            let embedder = create_embedder(&config.embedding)?;
            let answerer = create_answerer(&config.answer)?;
            let router = QueryRouter::new(
                &registry,
                store.as_ref(),
                embedder.as_ref(),
                answerer.as_ref(),
                &chat_log,
                config.retrieval.top_k,
            );
            let answer = router.route(mode, session, &question).await;
            println!("{}", answer);
        }

        Commands::Manifest => {
            let store = create_store(&config)?;
            let sync = Synchronizer::new(store.as_ref());
            let manifest = sync.fetch_manifest().await?;
            if manifest.is_empty() {
                println!("No documents have been published to the shared index yet.");
            } else {
                for name in manifest {
                    println!("{}", name);
                }
            }
        }

        Commands::History { mode } => {
            let mode = parse_mode(&mode)?;
            let turns = chat_log.load(mode).await?;
            if turns.is_empty() {
                println!("No chat history for today.");
            } else {
                for turn in turns {
                    println!("[{}] {}: {}", turn.timestamp, turn.role, turn.content);
                }
            }
        }

        Commands::ClearHistory { mode } => {
            let mode = parse_mode(&mode)?;
            chat_log.clear(mode).await?;
            println!("Cleared today's {} chat history.", mode.as_str());
        }
    }

    Ok(())
}
