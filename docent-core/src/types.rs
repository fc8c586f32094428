//! Core type definitions for Docent.
//!
//! Documents from the external source, chunks with typed provenance
//! metadata, search results, and chat messages.

use serde::{Deserialize, Serialize};

/// One record produced by the external document source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub content: String,
}

impl SourceDocument {
    /// Provenance metadata handed to the chunker for this document.
    pub fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source_id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }

    /// Human-readable name used in logs.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Provenance of a source text before it is chunked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl SourceMetadata {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Provenance attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub chunk_index: usize,
}

/// A bounded span of source text plus its provenance.
///
/// `content` is exactly the characters `start_offset..end_offset` of the
/// source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Chunk {
    /// Build a chunk with no source offsets, mostly useful in tests.
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        let content = content.into();
        let end_offset = content.chars().count();
        Self {
            content,
            metadata,
            start_offset: 0,
            end_offset,
        }
    }
}

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Squared Euclidean distance between the query and the stored vector.
    pub distance: f32,
    /// Row position in the index.
    pub position: usize,
}

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn, in the shape the chat API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_chat_message_missing_role_defaults_to_user() {
        let msg: ChatMessage = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_source_document_metadata() {
        let doc = SourceDocument {
            id: "page-1".into(),
            title: Some("Setup".into()),
            url: None,
            content: "Install the agent.".into(),
        };
        let meta = doc.metadata();
        assert_eq!(meta.source_id, "page-1");
        assert_eq!(meta.title.as_deref(), Some("Setup"));
        assert_eq!(doc.display_name(), "Setup");
    }

    #[test]
    fn test_source_document_optional_fields() {
        let doc: SourceDocument =
            serde_json::from_str(r#"{"id":"p","content":"body"}"#).unwrap();
        assert!(doc.title.is_none());
        assert!(doc.url.is_none());
        assert_eq!(doc.display_name(), "p");
    }

    #[test]
    fn test_chunk_new_sets_char_offsets() {
        let chunk = Chunk::new(
            "日本語",
            ChunkMetadata {
                source_id: "s".into(),
                title: None,
                url: None,
                chunk_index: 0,
            },
        );
        assert_eq!(chunk.start_offset, 0);
        assert_eq!(chunk.end_offset, 3);
    }
}
