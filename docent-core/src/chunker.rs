//! Recursive text chunking with overlap.
//!
//! Text is cut into contiguous pieces at the most natural boundary that keeps
//! each piece within `chunk_size` characters (paragraph, then line, sentence,
//! word, character). Pieces are then merged greedily into chunks, and each
//! chunk after the first starts with a tail of whole pieces from its
//! predecessor that is at most `chunk_overlap` characters long.
//!
//! Every chunk is an exact character span of the input, so dropping the
//! overlapping prefix of each chunk and concatenating reproduces the text.

use std::collections::VecDeque;
use std::ops::Range;

use tracing::{debug, warn};

use crate::config::ChunkingConfig;
use crate::error::{ChunkError, ConfigError};
use crate::types::{Chunk, ChunkMetadata, SourceMetadata};

/// Splits source text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: config.separators.clone(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks carrying a copy of `metadata`.
    ///
    /// Never fails: problems are logged and produce an empty result, which
    /// callers treat as "nothing to index" for this source.
    pub fn split(&self, text: &str, metadata: &SourceMetadata) -> Vec<Chunk> {
        match self.try_split(text, metadata) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(
                    source_id = %metadata.source_id,
                    error = %e,
                    "Chunking failed, nothing to index for this source"
                );
                Vec::new()
            }
        }
    }

    /// Split `text`, reporting metadata problems instead of swallowing them.
    pub fn try_split(&self, text: &str, metadata: &SourceMetadata) -> Result<Vec<Chunk>, ChunkError> {
        let source_id = metadata.source_id.trim();
        if source_id.is_empty() {
            return Err(ChunkError::MissingSourceId);
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chars = CharIndex::new(text);
        let pieces = self.split_pieces(&chars, 0..chars.len(), 0);
        let windows = self.merge_pieces(&pieces);

        let title = non_blank(metadata.title.as_deref());
        let url = non_blank(metadata.url.as_deref());

        let chunks: Vec<Chunk> = windows
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| Chunk {
                content: chars.slice(span.clone()).to_string(),
                metadata: ChunkMetadata {
                    source_id: source_id.to_string(),
                    title: title.clone(),
                    url: url.clone(),
                    chunk_index,
                },
                start_offset: span.start,
                end_offset: span.end,
            })
            .collect();

        debug!(
            source_id,
            chars = chars.len(),
            chunks = chunks.len(),
            "Split source text"
        );
        Ok(chunks)
    }

    /// Cut `range` into pieces of at most `chunk_size` characters, starting
    /// with the separator at `level`.
    fn split_pieces(&self, chars: &CharIndex<'_>, range: Range<usize>, level: usize) -> Vec<Range<usize>> {
        if range.len() <= self.chunk_size {
            return vec![range];
        }

        for (offset, separator) in self.separators.iter().enumerate().skip(level) {
            if separator.is_empty() {
                return range.map(|i| i..i + 1).collect();
            }
            let parts = split_after(chars, range.clone(), separator);
            if parts.len() < 2 {
                continue;
            }
            let mut pieces = Vec::with_capacity(parts.len());
            for part in parts {
                if part.len() <= self.chunk_size {
                    pieces.push(part);
                } else {
                    pieces.extend(self.split_pieces(chars, part, offset + 1));
                }
            }
            return pieces;
        }

        // No separator applies and there is no character-level fallback.
        range
            .clone()
            .step_by(self.chunk_size)
            .map(|start| start..(start + self.chunk_size).min(range.end))
            .collect()
    }

    fn merge_pieces(&self, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        let mut current: VecDeque<Range<usize>> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.len();
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(span) = span_of(&current) {
                    windows.push(span);
                }
                // Keep a tail no longer than the overlap that leaves room for `piece`.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= front.len(),
                        None => break,
                    }
                }
            }
            current.push_back(piece.clone());
            total += len;
        }

        if let Some(span) = span_of(&current) {
            windows.push(span);
        }
        windows
    }
}

fn span_of(pieces: &VecDeque<Range<usize>>) -> Option<Range<usize>> {
    Some(pieces.front()?.start..pieces.back()?.end)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Split `range` after every occurrence of `separator`, keeping the separator
/// at the end of the piece it terminates.
fn split_after(chars: &CharIndex<'_>, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let base = chars.byte_offset(range.start);
    let mut parts = Vec::new();
    let mut start = range.start;
    for (idx, matched) in chars.slice(range.clone()).match_indices(separator) {
        let end = chars.char_at_byte(base + idx + matched.len());
        if end > start {
            parts.push(start..end);
            start = end;
        }
    }
    if start < range.end {
        parts.push(start..range.end);
    }
    parts
}

/// Character-indexed view over a string.
struct CharIndex<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length as a sentinel.
    byte_offsets: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    fn len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.byte_offsets[char_idx]
    }

    fn char_at_byte(&self, byte: usize) -> usize {
        self.byte_offsets
            .binary_search(&byte)
            .unwrap_or_else(|insert_at| insert_at)
    }

    fn slice(&self, range: Range<usize>) -> &'a str {
        &self.text[self.byte_offsets[range.start]..self.byte_offsets[range.end]]
    }
}
