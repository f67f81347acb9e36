//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not
//!   configured.
//! - **[`HttpEmbedder`]** — calls an OpenAI-compatible embeddings API with
//!   batching, retry, and backoff.
//!
//! # Retry Strategy
//!
//! The HTTP provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Maps text to a fixed-dimension vector. Deterministic for a fixed model
/// version; the dimensionality is constant per provider instance.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single query text. Convenience wrapper around
    /// [`embed_batch`](Embedder::embed_batch).
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        if results.is_empty() {
            return Err(EmbedError::BadResponse("empty embedding response".into()));
        }
        Ok(results.remove(0))
    }
}

/// A no-op provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

/// Embedding provider for OpenAI-compatible `POST /v1/embeddings` endpoints.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct HttpEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpEmbedder {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Fails if `model`/`dims` are unset or `OPENAI_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for http provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for http provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            anyhow::bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbedError::Transport("OPENAI_API_KEY not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::BadResponse(e.to_string()))?;
                        return parse_embeddings_response(&json, self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(EmbedError::Api {
                            status: status.as_u16(),
                            body: body_text,
                        });
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(EmbedError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(EmbedError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbedError::Transport("embedding failed after retries".into())))
    }
}

/// Parse an embeddings API response, extracting `data[].embedding` in order
/// and validating each vector's length against the configured dims.
fn parse_embeddings_response(
    json: &serde_json::Value,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::BadResponse("missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::BadResponse("missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(EmbedError::BadResponse(format!(
                "provider returned {} dims, expected {}",
                vec.len(),
                dims
            )));
        }

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// # Errors
///
/// Fails for unknown provider names or if the HTTP provider cannot be
/// initialized (missing config or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(HttpEmbedder::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let e = DisabledEmbedder;
        let err = e.embed_batch(&["hi".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled));
    }

    #[test]
    fn test_parse_response_order_and_dims() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [1.0, 0.0] },
                { "embedding": [0.0, 1.0] },
            ]
        });
        let out = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_wrong_dims() {
        let json = serde_json::json!({ "data": [{ "embedding": [1.0, 0.0, 0.0] }] });
        let err = parse_embeddings_response(&json, 2).unwrap_err();
        assert!(matches!(err, EmbedError::BadResponse(_)));
    }

    #[test]
    fn test_parse_response_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_embeddings_response(&json, 2).is_err());
    }
}
