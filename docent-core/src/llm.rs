//! Chat model collaborator.
//!
//! Defines the `ChatBackend` trait, the Ollama `/api/chat` wire types, the
//! HTTP client that speaks them, and a scripted backend for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use crate::types::ChatMessage;

/// Sampling and context options forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_ctx: u32,
    pub num_predict: u32,
}

/// A non-streaming chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(config: &LlmConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: config.temperature,
                num_ctx: config.num_ctx,
                num_predict: config.num_predict,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// Sends one chat request and returns the raw assistant text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Ollama chat client (`POST /api/chat`, `stream: false`).
pub struct OllamaChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build chat HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::ApiRequest {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), model = %self.model, "Chat request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;
        Ok(parsed.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted backend for tests and offline runs.
///
/// Queued replies are consumed in order; once exhausted it answers with the
/// fallback reply.
pub struct MockChatBackend {
    replies: Mutex<Vec<Result<String, LlmError>>>,
    fallback: String,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fallback: "I'm a mock model. No queued replies available.".to_string(),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A backend that always answers with `text`.
    pub fn with_reply(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue(&self, reply: Result<String, LlmError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push(reply);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Default for MockChatBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = match self.replies.lock() {
            Ok(mut replies) if !replies.is_empty() => Some(replies.remove(0)),
            _ => None,
        };
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
