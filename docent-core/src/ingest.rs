//! Batch index builds.
//!
//! Each document is chunked, embedded in batches, and appended to the index
//! as one unit. A document that fails at any step is skipped and recorded in
//! the summary; the rest of the batch carries on.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunker::RecursiveChunker;
use crate::config::DocentConfig;
use crate::embeddings::{EmbeddingProvider, create_embedder};
use crate::error::{DocentError, EmbeddingError};
use crate::index::VectorIndex;
use crate::source;
use crate::types::{Chunk, SourceDocument};

/// A document that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub source_id: String,
    pub reason: String,
}

/// Counts from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub documents_seen: usize,
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestSummary {
    fn skip(&mut self, source_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(source_id, reason = %reason, "Skipping document");
        self.documents_skipped += 1;
        self.failures.push(IngestFailure {
            source_id: source_id.to_string(),
            reason,
        });
    }
}

/// Builds a fresh index from source documents.
pub struct IndexBuilder {
    chunker: RecursiveChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(
        chunker: RecursiveChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Builder using the configured chunker and embedding provider.
    pub fn from_config(config: &DocentConfig) -> Result<Self, DocentError> {
        let chunker = RecursiveChunker::new(&config.chunking)?;
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(chunker, embedder, config.embedding.batch_size))
    }

    /// Read the documents at `path` and index them.
    pub async fn build_from_source(
        &self,
        path: &Path,
    ) -> Result<(VectorIndex, IngestSummary), DocentError> {
        let documents = source::load_documents(path)?;
        info!(documents = documents.len(), source = %path.display(), "Loaded documents");
        Ok(self.build(&documents).await)
    }

    /// Index every document, skipping the ones that fail.
    pub async fn build(&self, documents: &[SourceDocument]) -> (VectorIndex, IngestSummary) {
        let mut index = VectorIndex::new();
        let mut summary = IngestSummary::default();

        for doc in documents {
            summary.documents_seen += 1;

            let chunks = self.chunker.split(&doc.content, &doc.metadata());
            if chunks.is_empty() {
                summary.skip(&doc.id, "no chunks produced");
                continue;
            }

            let vectors = match self.embed_chunks(&chunks).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    summary.skip(&doc.id, format!("embedding failed: {e}"));
                    continue;
                }
            };

            match index.add(chunks, vectors) {
                Ok(added) => {
                    summary.documents_indexed += 1;
                    summary.chunks_indexed += added;
                    debug!(source_id = %doc.id, title = doc.display_name(), chunks = added, "Indexed document");
                }
                Err(e) => summary.skip(&doc.id, format!("index rejected batch: {e}")),
            }
        }

        info!(
            seen = summary.documents_seen,
            indexed = summary.documents_indexed,
            skipped = summary.documents_skipped,
            chunks = summary.chunks_indexed,
            "Index build finished"
        );
        (index, summary)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed_documents(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embeddings::LocalEmbedder;
    use crate::error::SourceError;
    use async_trait::async_trait;

    fn doc(id: &str, content: &str) -> SourceDocument {
        SourceDocument {
            id: id.into(),
            title: Some(id.to_uppercase()),
            url: None,
            content: content.into(),
        }
    }

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(&ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            ..Default::default()
        })
        .unwrap()
    }

    /// Fails whenever a batch contains the word "poison".
    struct PickyEmbedder(LocalEmbedder);

    #[async_trait]
    impl EmbeddingProvider for PickyEmbedder {
        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(EmbeddingError::Request {
                    message: "refused".into(),
                });
            }
            self.0.embed_documents(texts).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.0.embed_query(text).await
        }

        fn dimensions(&self) -> Option<usize> {
            EmbeddingProvider::dimensions(&self.0)
        }

        fn provider_name(&self) -> &str {
            "picky"
        }
    }

    #[tokio::test]
    async fn test_build_counts_chunks_across_batches() {
        let builder = IndexBuilder::new(chunker(20, 0), Arc::new(LocalEmbedder::new(32)), 2);
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let (index, summary) = builder.build(&[doc("a", text)]).await;

        assert!(summary.chunks_indexed > 2);
        assert_eq!(summary.documents_indexed, 1);
        assert_eq!(index.len(), summary.chunks_indexed);
        assert_eq!(index.dimension(), Some(32));
        assert!(index.documents().iter().all(|c| c.metadata.source_id == "a"));
    }

    #[tokio::test]
    async fn test_build_skips_failures_and_continues() {
        let builder = IndexBuilder::new(
            chunker(100, 10),
            Arc::new(PickyEmbedder(LocalEmbedder::new(16))),
            8,
        );
        let docs = vec![
            doc("good", "Restart the router to apply changes."),
            doc("empty", "   \n "),
            doc("bad", "This page contains poison."),
            doc("also-good", "Backups run nightly."),
        ];
        let (index, summary) = builder.build(&docs).await;

        assert_eq!(summary.documents_seen, 4);
        assert_eq!(summary.documents_indexed, 2);
        assert_eq!(summary.documents_skipped, 2);
        assert_eq!(index.len(), 2);
        let skipped: Vec<&str> = summary.failures.iter().map(|f| f.source_id.as_str()).collect();
        assert_eq!(skipped, vec!["empty", "bad"]);
    }

    fn local_config() -> DocentConfig {
        let mut config = DocentConfig::default();
        config.embedding.provider = "local".into();
        config.embedding.dimensions = 16;
        config
    }

    #[tokio::test]
    async fn test_build_from_source_reads_jsonl() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pages.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"content\":\"Reset the password from the login page.\"}\n",
        )
        .unwrap();

        let builder = IndexBuilder::from_config(&local_config()).unwrap();
        let (index, summary) = builder.build_from_source(&path).await.unwrap();
        assert_eq!(summary.documents_indexed, 1);
        assert_eq!(index.dimension(), Some(16));
    }

    #[tokio::test]
    async fn test_build_from_missing_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let builder = IndexBuilder::from_config(&local_config()).unwrap();
        let err = builder
            .build_from_source(&dir.path().join("absent.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocentError::Source(SourceError::NotFound { .. })));
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let mut config = local_config();
        config.embedding.provider = "word2vec".into();
        let err = IndexBuilder::from_config(&config).err().unwrap();
        assert!(matches!(err, DocentError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_empty_input() {
        let builder = IndexBuilder::new(chunker(50, 5), Arc::new(LocalEmbedder::new(8)), 4);
        let (index, summary) = builder.build(&[]).await;
        assert!(index.is_empty());
        assert_eq!(summary, IngestSummary::default());
    }
}
