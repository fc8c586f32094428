//! Grounded answer generation.
//!
//! Builds a bounded chat request from retrieved contexts, the question, and
//! recent conversation history, sends it to the chat backend under a
//! timeout, and sanitizes the reply. Failures never propagate to the caller:
//! they become a fixed degraded-service message.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm::{ChatBackend, ChatRequest};
use crate::types::ChatMessage;

/// Returned when the chat backend fails or times out.
pub const DEGRADED_ANSWER: &str =
    "Sorry, the answer service is temporarily unavailable. Please try again in a moment.";

/// Returned when the model produced nothing usable.
pub const EMPTY_ANSWER: &str =
    "Sorry, I couldn't produce an answer to that question. Please try rephrasing it.";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block regex"));

const THINK_START: &str = "<think>";

/// Remove reasoning blocks from a model reply.
///
/// Closed `<think>...</think>` blocks are removed wherever they appear; an
/// unterminated `<think>` drops everything after it.
pub fn strip_reasoning(raw: &str) -> String {
    let without_blocks = THINK_BLOCK.replace_all(raw, "");
    let visible = match without_blocks.find(THINK_START) {
        Some(start) => &without_blocks[..start],
        None => &without_blocks[..],
    };
    visible.trim().to_string()
}

/// Build the grounded user prompt.
pub fn build_prompt(query: &str, contexts: &[String]) -> String {
    let material = if contexts.is_empty() {
        "(no reference material was found)".to_string()
    } else {
        contexts.join("\n\n")
    };
    format!(
        "Answer the question using only the reference material below. \
         It is the only permitted source of facts.\n\n\
         ### Reference material\n{material}\n\n\
         ### Question\n{query}\n\n\
         If the material does not contain enough information to answer, \
         say so explicitly instead of guessing."
    )
}

/// Produces sanitized answers from a chat backend.
pub struct AnswerGenerator {
    backend: Arc<dyn ChatBackend>,
    config: LlmConfig,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, config: LlmConfig) -> Self {
        let timeout = config.timeout();
        Self {
            backend,
            config,
            timeout,
        }
    }

    /// Override the wall-clock bound on one backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Messages sent for `query`: recent history, then the prompt.
    pub fn build_messages(
        &self,
        query: &str,
        contexts: &[String],
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let keep = history.len().min(self.config.max_history_turns);
        let mut messages: Vec<ChatMessage> = history[history.len() - keep..].to_vec();
        messages.push(ChatMessage::user(build_prompt(query, contexts)));
        messages
    }

    /// Generate an answer. Always returns user-presentable text.
    pub async fn generate(
        &self,
        query: &str,
        contexts: &[String],
        history: &[ChatMessage],
    ) -> String {
        let messages = self.build_messages(query, contexts, history);
        let request = ChatRequest::new(&self.config, messages);
        debug!(
            model = self.backend.model_name(),
            contexts = contexts.len(),
            history = history.len(),
            "Generating answer"
        );

        let raw = match tokio::time::timeout(self.timeout, self.backend.chat(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "Chat backend failed");
                return DEGRADED_ANSWER.to_string();
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Chat backend timed out");
                return DEGRADED_ANSWER.to_string();
            }
        };

        let answer = strip_reasoning(&raw);
        if answer.is_empty() {
            debug!(raw_len = raw.len(), "Model reply was empty after sanitizing");
            return EMPTY_ANSWER.to_string();
        }
        answer
    }
}
