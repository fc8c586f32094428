//! Query-time retrieval: embed the question, search the serving index, and
//! turn hits into prompt contexts with human-readable source labels.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embeddings::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::index::IndexHandle;
use crate::types::{ChunkMetadata, SearchResult};

/// Title used for chunks whose source had none.
pub const UNKNOWN_TITLE: &str = "Unknown page";

/// Contexts and their positionally paired source labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    pub contexts: Vec<String>,
    pub sources: Vec<String>,
    pub hits: Vec<SearchResult>,
}

/// Format the source label shown next to an answer.
pub fn source_label(metadata: &ChunkMetadata) -> String {
    let title = metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE);
    match metadata.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => format!("{title} ({url})"),
        None => title.to_string(),
    }
}

/// Embeds queries and searches the shared index.
pub struct RetrievalOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<IndexHandle>,
    top_k: usize,
}

impl RetrievalOrchestrator {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<IndexHandle>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve contexts and sources, degrading to empty lists on failure.
    pub async fn retrieve(&self, query: &str) -> (Vec<String>, Vec<String>) {
        match self.try_retrieve(query).await {
            Ok(retrieved) => (retrieved.contexts, retrieved.sources),
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                (Vec::new(), Vec::new())
            }
        }
    }

    /// Retrieve with the underlying failure exposed.
    pub async fn try_retrieve(&self, query: &str) -> Result<Retrieved, RetrievalError> {
        if query.trim().is_empty() {
            return Ok(Retrieved::default());
        }
        let index = self.index.current().ok_or(RetrievalError::IndexUnavailable)?;
        if index.is_empty() {
            debug!("Index is empty, nothing to retrieve");
            return Ok(Retrieved::default());
        }

        let vector = self.embedder.embed_query(query).await?;
        let hits = index.search(&vector, self.top_k)?;

        let contexts = hits.iter().map(|h| h.chunk.content.clone()).collect();
        let sources = hits.iter().map(|h| source_label(&h.chunk.metadata)).collect();
        debug!(
            hits = hits.len(),
            top_k = self.top_k,
            best_distance = ?hits.first().map(|h| h.distance),
            "Retrieved contexts"
        );
        Ok(Retrieved {
            contexts,
            sources,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::error::IndexError;
    use crate::index::VectorIndex;
    use crate::types::Chunk;

    fn metadata(title: Option<&str>, url: Option<&str>) -> ChunkMetadata {
        ChunkMetadata {
            source_id: "s".into(),
            title: title.map(String::from),
            url: url.map(String::from),
            chunk_index: 0,
        }
    }

    #[test]
    fn test_source_label_variants() {
        assert_eq!(
            source_label(&metadata(Some("Setup"), Some("https://x/setup"))),
            "Setup (https://x/setup)"
        );
        assert_eq!(source_label(&metadata(Some("Setup"), None)), "Setup");
        assert_eq!(source_label(&metadata(None, None)), UNKNOWN_TITLE);
        assert_eq!(
            source_label(&metadata(Some("  "), Some("https://x"))),
            "Unknown page (https://x)"
        );
    }

    async fn orchestrator_with(texts: &[&str]) -> RetrievalOrchestrator {
        let embedder = Arc::new(LocalEmbedder::new(256));
        let docs: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = embedder.embed_documents(&docs).await.unwrap();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(*t, metadata(Some(&format!("Page {i}")), None)))
            .collect();
        let mut index = VectorIndex::new();
        index.add(chunks, vectors).unwrap();
        RetrievalOrchestrator::new(embedder, Arc::new(IndexHandle::new(index)), 2)
    }

    #[tokio::test]
    async fn test_retrieve_pairs_contexts_and_sources() {
        let retriever =
            orchestrator_with(&["restart the printer", "reset the password", "cook the rice"])
                .await;
        let (contexts, sources) = retriever.retrieve("password reset").await;
        assert_eq!(contexts.len(), 2);
        assert_eq!(sources.len(), 2);
        assert_eq!(contexts[0], "reset the password");
        assert_eq!(sources[0], "Page 1");
    }

    #[tokio::test]
    async fn test_retrieve_empty_query() {
        let retriever = orchestrator_with(&["anything"]).await;
        assert_eq!(retriever.retrieve("   ").await, (vec![], vec![]));
    }

    #[tokio::test]
    async fn test_retrieve_without_index() {
        let retriever = RetrievalOrchestrator::new(
            Arc::new(LocalEmbedder::new(8)),
            Arc::new(IndexHandle::empty()),
            5,
        );
        assert!(matches!(
            retriever.try_retrieve("hello").await,
            Err(RetrievalError::IndexUnavailable)
        ));
        assert_eq!(retriever.retrieve("hello").await, (vec![], vec![]));
    }

    #[tokio::test]
    async fn test_retrieve_dimension_mismatch_degrades() {
        let mut index = VectorIndex::new();
        index
            .add(vec![Chunk::new("x", metadata(None, None))], vec![vec![1.0; 4]])
            .unwrap();
        let retriever = RetrievalOrchestrator::new(
            Arc::new(LocalEmbedder::new(8)),
            Arc::new(IndexHandle::new(index)),
            5,
        );
        assert!(matches!(
            retriever.try_retrieve("hello").await,
            Err(RetrievalError::Index(IndexError::DimensionMismatch { .. }))
        ));
        assert_eq!(retriever.retrieve("hello").await, (vec![], vec![]));
    }
}
