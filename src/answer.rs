//! Answer generation over retrieved context.
//!
//! Retrieved chunks are stitched into a grounding prompt and handed to an
//! OpenAI-compatible chat completions endpoint. The model is instructed to
//! answer only from the supplied context and to say so when the context
//! does not contain the answer.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::AnswerConfig;
use crate::error::AnswerError;
use crate::models::Chunk;

const REFUSAL_LINE: &str =
    "I don't have enough information in the provided documents to answer that.";

/// Turns retrieved chunks plus a question into an answer.
#[async_trait]
pub trait Answerer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn answer(&self, context: &[Chunk], question: &str) -> Result<String, AnswerError>;
}

/// Placeholder used when no answer provider is configured. Query routing
/// still works; it just returns the retrieved passages verbatim instead of
/// a generated answer.
pub struct DisabledAnswerer;

#[async_trait]
impl Answerer for DisabledAnswerer {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn answer(&self, context: &[Chunk], _question: &str) -> Result<String, AnswerError> {
        if context.is_empty() {
            return Ok(REFUSAL_LINE.to_string());
        }
        let passages: Vec<&str> = context.iter().map(|c| c.text.as_str()).collect();
        Ok(passages.join("\n\n"))
    }
}

/// Answerer backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// Reads the API key from the `ANSWER_API_KEY` environment variable.
pub struct ChatAnswerer {
    model: String,
    base_url: String,
    temperature: f32,
    timeout_secs: u64,
}

impl ChatAnswerer {
    pub fn new(config: &AnswerConfig) -> Self {
        Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        }
    }

    fn build_prompt(context: &[Chunk], question: &str) -> (String, String) {
        let mut context_block = String::new();
        for chunk in context {
            context_block.push_str(&format!(
                "[source: {}]\n{}\n\n",
                chunk.source_document, chunk.text
            ));
        }
        let system = format!(
            "You are a helpful assistant that answers questions strictly from \
             the provided document excerpts. If the excerpts do not contain the \
             answer, reply exactly: \"{}\" Do not use outside knowledge.",
            REFUSAL_LINE
        );
        let user = format!(
            "Document excerpts:\n\n{}Question: {}",
            context_block, question
        );
        (system, user)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Answerer for ChatAnswerer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn answer(&self, context: &[Chunk], question: &str) -> Result<String, AnswerError> {
        if context.is_empty() {
            return Ok(REFUSAL_LINE.to_string());
        }

        let api_key = std::env::var("ANSWER_API_KEY")
            .map_err(|_| AnswerError::Transport("ANSWER_API_KEY not set".to_string()))?;

        let (system, user) = Self::build_prompt(context, question);
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AnswerError::Transport(e.to_string()))?;

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AnswerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnswerError::BadResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AnswerError::BadResponse("response contained no choices".to_string()))?;

        Ok(content.trim().to_string())
    }
}

/// Create an answerer from configuration.
///
/// # Errors
///
/// Fails when the configured provider is unrecognized.
pub fn create_answerer(config: &AnswerConfig) -> anyhow::Result<Box<dyn Answerer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAnswerer)),
        "openai" => Ok(Box::new(ChatAnswerer::new(config))),
        other => anyhow::bail!(
            "unknown answer provider '{}' (expected 'openai' or 'disabled')",
            other
        ),
    }
}
