//! # Docent Core
//!
//! Retrieval-augmented question answering over a corpus of manual pages.
//! Provides the chunker, embedding providers, exact vector index and its
//! on-disk snapshots, retrieval, grounded answer generation, batch ingest,
//! the HTTP chat API, configuration, and error types.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod persistence;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod source;
pub mod types;

// Re-export commonly used types at the crate root.
pub use chunker::RecursiveChunker;
pub use config::{DocentConfig, load_config};
pub use embeddings::{EmbeddingProvider, LocalEmbedder, OllamaEmbedder, create_embedder};
pub use error::{
    ChunkError, ConfigError, DocentError, EmbeddingError, IndexError, LlmError, Result,
    RetrievalError, SnapshotError, SourceError,
};
pub use generator::{AnswerGenerator, DEGRADED_ANSWER, EMPTY_ANSWER};
pub use index::{IndexHandle, VectorIndex};
pub use ingest::{IndexBuilder, IngestFailure, IngestSummary};
pub use llm::{ChatBackend, ChatRequest, MockChatBackend, OllamaChatClient};
pub use persistence::IndexSnapshot;
pub use pipeline::{RagAnswer, RagPipeline};
pub use retriever::RetrievalOrchestrator;
pub use types::{
    ChatMessage, Chunk, ChunkMetadata, Role, SearchResult, SourceDocument, SourceMetadata,
};
