//! Error types for the Docent core library.
//!
//! Uses `thiserror` for public API error types, one enum per failure domain:
//! index validation, snapshot persistence, embedding, retrieval, the chat
//! collaborator, chunking, document sources, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Docent core library.
#[derive(Debug, thiserror::Error)]
pub enum DocentError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation failures on index mutation or search. The index is never
/// modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: index has {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Count mismatch: {chunks} chunks but {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },

    #[error("Cannot add an empty batch")]
    EmptyBatch,

    #[error("Invalid dimension: {0}")]
    InvalidDimension(usize),

    #[error("Vector {row} of the batch contains a non-finite value")]
    NonFiniteValue { row: usize },
}

/// Failures loading or saving an index snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot file missing: {path}")]
    Missing { path: PathBuf },

    #[error("Snapshot file corrupt: {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Inconsistent snapshot: {reason}")]
    Inconsistent { reason: String },

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from an embedding provider.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {message}")]
    Request { message: String },

    #[error("Embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Embedding response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Embedding request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embeddings in one response have different dimensions ({first} vs {other})")]
    InconsistentDimensions { first: usize, other: usize },

    #[error("Empty embedding returned")]
    Empty,
}

/// Why a retrieval produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("No index is loaded")]
    IndexUnavailable,

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index search failed: {0}")]
    Index(#[from] IndexError),
}

/// Failures from the chat generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Failures inside the chunker. `RecursiveChunker::split` turns these into an
/// empty result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("Source metadata has an empty source_id")]
    MissingSourceId,
}

/// Failures reading the external document source export.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to parse {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Source IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DocentError`.
pub type Result<T> = std::result::Result<T, DocentError>;
