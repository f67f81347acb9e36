use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            metric: "cosine".to_string(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_metric() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            base_url: default_embedding_base_url(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default = "default_answer_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_answer_model(),
            base_url: default_answer_base_url(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

fn default_answer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_answer_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            ttl_secs: 86400,
        }
    }
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn default_ttl_secs() -> u64 {
    86400
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_dir")]
    pub dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            dir: default_chat_dir(),
        }
    }
}

fn default_chat_dir() -> PathBuf {
    PathBuf::from("./data/chat")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub backend: String,
    #[serde(default)]
    pub s3: Option<S3RemoteConfig>,
    #[serde(default)]
    pub fs: Option<FsRemoteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3RemoteConfig {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FsRemoteConfig {
    pub root: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    match config.retrieval.metric.as_str() {
        "cosine" | "l2" => {}
        other => anyhow::bail!("Unknown retrieval metric: '{}'. Must be cosine or l2.", other),
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.answer.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown answer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate remote
    match config.remote.backend.as_str() {
        "s3" => {
            if config.remote.s3.is_none() {
                anyhow::bail!("[remote.s3] section required when remote.backend is 's3'");
            }
        }
        "fs" => {
            if config.remote.fs.is_none() {
                anyhow::bail!("[remote.fs] section required when remote.backend is 'fs'");
            }
        }
        other => anyhow::bail!("Unknown remote backend: '{}'. Must be s3 or fs.", other),
    }

    if config.sessions.ttl_secs == 0 {
        anyhow::bail!("sessions.ttl_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[remote]
backend = "fs"

[remote.fs]
root = "/tmp/ragpool-remote"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.sessions.ttl_secs, 86400);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let file = write_config(
            r#"
[chunking]
chunk_size = 100
overlap = 100

[remote]
backend = "fs"

[remote.fs]
root = "/tmp/ragpool-remote"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let file = write_config(
            r#"
[embedding]
provider = "openai"

[remote]
backend = "fs"

[remote.fs]
root = "/tmp/ragpool-remote"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_s3_backend_requires_s3_section() {
        let file = write_config(
            r#"
[remote]
backend = "s3"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let file = write_config(
            r#"
[remote]
backend = "gcs"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_full_s3_config_parses() {
        let file = write_config(
            r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[answer]
provider = "openai"
model = "gpt-4o-mini"

[remote]
backend = "s3"

[remote.s3]
bucket = "ragpool-shared"
region = "eu-west-1"
prefix = "prod"
"#,
        );
        let config = load_config(file.path()).unwrap();
        let s3 = config.remote.s3.unwrap();
        assert_eq!(s3.bucket, "ragpool-shared");
        assert_eq!(s3.region, "eu-west-1");
        assert_eq!(s3.prefix, "prod");
        assert!(s3.endpoint_url.is_none());
        assert_eq!(config.answer.temperature, 0.3);
    }
}
