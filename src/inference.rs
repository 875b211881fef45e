//! Inference backend client: chat completion and text embeddings.
//!
//! [`InferenceClient`] is the seam between the analysis pipeline and the
//! text-generation service. [`OllamaClient`] talks to an Ollama-compatible
//! server:
//!
//! | Call | Endpoint | Request | Response field |
//! |------|----------|---------|----------------|
//! | [`chat`](InferenceClient::chat) | `POST /api/chat` | `{model, messages, stream: false, options?}` | `message.content` |
//! | [`embed_batch`](InferenceClient::embed_batch) | `POST /api/embed` | `{model, input}` | `embeddings[]` |
//!
//! Calls are single-shot: a failed request is reported, never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::InferenceConfig;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("backend returned empty content")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat-style request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Non-streaming chat completion. Returns the assistant's text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, InferenceError>;

    /// Embedding vector for one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Embedding vectors for several texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// [`InferenceClient`] for an Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

impl OllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(InferenceError::Http)?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<String, InferenceError> {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(e, timeout))?;

        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        Ok(text)
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout(timeout)
    } else {
        InferenceError::Http(err)
    }
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn parse_chat_response(body: &str) -> Result<String, InferenceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
    let content = parsed
        .message
        .ok_or_else(|| InferenceError::MalformedResponse("missing message".to_string()))?
        .content
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(InferenceError::EmptyResponse);
    }
    Ok(content)
}

fn parse_embed_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, InferenceError> {
    let parsed: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
    if parsed.embeddings.len() != expected {
        return Err(InferenceError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            parsed.embeddings.len()
        )));
    }
    Ok(parsed.embeddings)
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            stream: false,
            options: self
                .config
                .temperature
                .map(|temperature| ChatOptions { temperature }),
        };
        let timeout = Duration::from_secs(self.config.chat_timeout_secs);

        debug!(model = %self.config.chat_model, messages = messages.len(), "sending chat request");
        let body = self.post_json("/api/chat", &request, timeout).await?;
        parse_chat_response(&body)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(InferenceError::EmptyResponse)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.config.embed_model,
            input: texts,
        };
        let timeout = Duration::from_secs(self.config.embed_timeout_secs);

        let body = self.post_json("/api/embed", &request, timeout).await?;
        parse_embed_response(&body, texts.len())
    }
}
