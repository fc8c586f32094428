//! End-to-end question answering: retrieve, then generate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DocentConfig;
use crate::embeddings::{EmbeddingProvider, create_embedder};
use crate::error::ConfigError;
use crate::generator::AnswerGenerator;
use crate::index::IndexHandle;
use crate::llm::{ChatBackend, OllamaChatClient};
use crate::retriever::{RetrievalOrchestrator, Retrieved};
use crate::types::ChatMessage;

/// Answer text plus the labels of the pages it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Retrieval and generation wired together over a shared index.
pub struct RagPipeline {
    retriever: RetrievalOrchestrator,
    generator: AnswerGenerator,
}

impl RagPipeline {
    pub fn new(retriever: RetrievalOrchestrator, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Build a pipeline from explicit collaborators.
    pub fn with_components(
        config: &DocentConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn ChatBackend>,
        index: Arc<IndexHandle>,
    ) -> Self {
        let retriever = RetrievalOrchestrator::new(embedder, index, config.retrieval.top_k);
        let generator = AnswerGenerator::new(backend, config.llm.clone());
        Self::new(retriever, generator)
    }

    /// Build a pipeline talking to the configured embedding and chat services.
    pub fn from_config(config: &DocentConfig, index: Arc<IndexHandle>) -> Result<Self, ConfigError> {
        let embedder = create_embedder(&config.embedding)?;
        let backend: Arc<dyn ChatBackend> = Arc::new(OllamaChatClient::new(&config.llm)?);
        Ok(Self::with_components(config, embedder, backend, index))
    }

    pub fn retriever(&self) -> &RetrievalOrchestrator {
        &self.retriever
    }

    /// Answer `query` given prior conversation turns.
    pub async fn answer(&self, query: &str, history: &[ChatMessage]) -> RagAnswer {
        let (contexts, sources) = self.retriever.retrieve(query).await;
        let answer = self.generator.generate(query, &contexts, history).await;
        info!(
            query_chars = query.chars().count(),
            contexts = contexts.len(),
            answer_chars = answer.chars().count(),
            "Answered question"
        );
        RagAnswer { answer, sources }
    }

    /// Like [`answer`](Self::answer), but also returns the retrieved contexts
    /// and hits for inspection.
    pub async fn answer_with_contexts(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> (RagAnswer, Retrieved) {
        let retrieved = self.retriever.try_retrieve(query).await.unwrap_or_else(|e| {
            warn!(error = %e, "Retrieval failed, continuing without context");
            Retrieved::default()
        });
        let answer = self
            .generator
            .generate(query, &retrieved.contexts, history)
            .await;
        (
            RagAnswer {
                answer,
                sources: retrieved.sources.clone(),
            },
            retrieved,
        )
    }
}
