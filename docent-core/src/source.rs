//! Readers for exported document sources.
//!
//! Two layouts are supported: a JSON-lines export with one
//! `{id, title?, url?, content}` object per line, and a directory tree of
//! markdown or plain-text files.

use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::SourceError;
use crate::types::SourceDocument;

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Load documents from a JSON-lines file or a directory.
pub fn load_documents(path: &Path) -> Result<Vec<SourceDocument>, SourceError> {
    if path.is_dir() {
        load_directory(path)
    } else if path.is_file() {
        load_jsonl(path)
    } else {
        Err(SourceError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Read one document per non-blank line.
pub fn load_jsonl(path: &Path) -> Result<Vec<SourceDocument>, SourceError> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SourceError::Io(e),
    })?;

    let mut documents = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: SourceDocument =
            serde_json::from_str(&line).map_err(|e| SourceError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: e.to_string(),
            })?;
        documents.push(doc);
    }
    debug!(path = %path.display(), documents = documents.len(), "Loaded JSON-lines source");
    Ok(documents)
}

/// Walk `dir` for markdown and text files.
///
/// The id is the path relative to `dir` and the title is the file stem.
/// Symlinks are followed. Entries that cannot be walked or read are logged
/// and skipped.
pub fn load_directory(dir: &Path) -> Result<Vec<SourceDocument>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::NotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut documents = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    path = ?e.path(),
                    error = %e,
                    "Skipping entry that could not be walked"
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !supported {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        let relative = path.strip_prefix(dir).unwrap_or(path);
        documents.push(SourceDocument {
            id: relative.to_string_lossy().replace('\\', "/"),
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            url: None,
            content,
        });
    }
    debug!(path = %dir.display(), documents = documents.len(), "Loaded directory source");
    Ok(documents)
}
