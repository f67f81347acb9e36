//! Typed errors for the structural contracts of the engine.
//!
//! The split matters: data-contract violations ([`IndexError`]) must surface
//! to the caller of the operation that hit them, while collaborator transport
//! failures ([`RemoteError`], [`EmbedError`], [`AnswerError`]) are converted
//! to user-facing messages at the query/sync boundary. Nothing here is ever
//! masked as a generic "try again".

use thiserror::Error;

/// Invalid caller-supplied parameters, rejected at the call site.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Violations of the vector-space and serialization contracts.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Building an index from zero entries is disallowed; callers gate
    /// empty-index queries upstream instead.
    #[error("cannot build an index from zero entries")]
    EmptyInput,

    #[error("query vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Dims or metric differ between the two indexes being merged.
    #[error("indexes are not merge-compatible: {0}")]
    Incompatible(String),

    /// The blob is truncated, foreign, or otherwise malformed. Deserialize
    /// never returns a partial index.
    #[error("corrupt index blob: {0}")]
    Corrupt(String),
}

/// Remote blob-store failures.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure or timeout talking to the store.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// A conditional put lost the race: the key's version no longer matches.
    #[error("remote precondition failed: key was modified concurrently")]
    PreconditionFailed,

    #[error("remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Publish (download-merge-upload) failures. The source stays visible so
/// callers can tell a corrupt remote blob from a transport outage.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("publish contended: gave up after {attempts} conditional-put attempts")]
    Contended { attempts: u32 },

    #[error("manifest is not valid JSON: {0}")]
    BadManifest(String),
}

/// Embedding collaborator failures (transport, quota, malformed response).
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("embedding response malformed: {0}")]
    BadResponse(String),
}

/// Answerer collaborator failures.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("answer request failed: {0}")]
    Transport(String),

    #[error("answer response malformed: {0}")]
    BadResponse(String),
}
