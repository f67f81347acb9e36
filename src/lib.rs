//! # Ragpool
//!
//! A session-aware retrieval pipeline with a shared, remotely persisted
//! vector index.
//!
//! Ragpool ingests text documents, chunks and embeds them, and keeps the
//! resulting vectors in two places: a private per-session index, and an
//! optional shared index that lives in an object store and is merged into
//! by every publishing session. Queries route to either index and are
//! answered by a chat model grounded in the retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Documents │──▶│   Pipeline   │──▶│ Session Index │
//! │ (UTF-8)   │   │ Chunk+Embed │   │  (per UUID)   │
//! └───────────┘   └─────────────┘   └──────┬────────┘
//!                                          │ publish
//!                                          ▼
//!                                  ┌───────────────┐
//!                                  │ Shared Index  │
//!                                  │  (S3 / fs)    │
//!                                  └──────┬────────┘
//!                                         │
//!                      ┌──────────────────┤
//!                      ▼                  ▼
//!                ┌──────────┐      ┌───────────┐
//!                │  Query    │      │ Manifest  │
//!                │ (router)  │      │  (JSON)   │
//!                └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragpool session                            # mint a session id
//! ragpool ingest notes.txt --session <id>    # private to this session
//! ragpool ingest report.txt --session <id> --publish
//! ragpool query "what changed?" --mode local --session <id>
//! ragpool query "what changed?" --mode shared --session <id>
//! ragpool manifest                           # documents in the shared index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping character chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index, merging, binary codec |
//! | [`session`] | Session registry with TTL eviction |
//! | [`remote`] | Remote store abstraction with conditional writes |
//! | [`remote_s3`] | S3-compatible remote store |
//! | [`sync`] | Shared-index publish cycle |
//! | [`query`] | Query routing over local or shared index |
//! | [`answer`] | Grounded answer generation |
//! | [`chatlog`] | Per-day chat history files |
//! | [`ingest`] | End-to-end ingestion pipeline |

pub mod answer;
pub mod chatlog;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod query;
pub mod remote;
pub mod remote_s3;
pub mod session;
pub mod sync;
