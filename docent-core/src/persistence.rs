//! Atomic file writes and on-disk index snapshots.
//!
//! A snapshot is a directory holding `vectors.bin` (binary vector matrix) and
//! `documents.json` (chunks plus a SHA-256 of `vectors.bin`). Both files are
//! staged as `.tmp` siblings and renamed, vectors first and documents last,
//! so a crash mid-save leaves either the old pair or a pair whose checksum
//! does not match. `load` detects the latter as an inconsistent snapshot.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::SnapshotError;
use crate::index::VectorIndex;
use crate::types::Chunk;

pub const DOCUMENTS_FILE: &str = "documents.json";
pub const VECTORS_FILE: &str = "vectors.bin";

const VECTORS_MAGIC: &[u8; 4] = b"DCVX";
const FORMAT_VERSION: u32 = 1;
// magic + version + dimension + row count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Atomically write JSON data to a file.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file via a `.tmp` sibling and rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = stage(path, data)?;
    std::fs::rename(&tmp, path)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn stage(path: &Path, data: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data)?;
    Ok(tmp)
}

/// `documents.json` contents.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentsFile {
    version: u32,
    dimension: usize,
    vectors_sha256: String,
    created_at: DateTime<Utc>,
    documents: Vec<Chunk>,
}

/// Summary of a snapshot written by [`VectorIndex::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub dir: PathBuf,
    pub documents: usize,
    pub dimension: usize,
    pub vectors_sha256: String,
    pub created_at: DateTime<Utc>,
}

impl IndexSnapshot {
    /// Whether both snapshot files are present in `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(DOCUMENTS_FILE).is_file() && dir.join(VECTORS_FILE).is_file()
    }
}

fn encode_vectors(dimension: usize, rows: usize, values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + values.len() * 4);
    buf.extend_from_slice(VECTORS_MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(dimension as u32).to_le_bytes());
    buf.extend_from_slice(&(rows as u64).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

struct DecodedVectors {
    dimension: usize,
    rows: usize,
    values: Vec<f32>,
}

fn decode_vectors(path: &Path, bytes: &[u8]) -> Result<DecodedVectors, SnapshotError> {
    let corrupt = |reason: String| SnapshotError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if &header[0..4] != VECTORS_MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let dimension = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let mut count = [0u8; 8];
    count.copy_from_slice(&header[12..20]);
    let rows = u64::from_le_bytes(count) as usize;

    if dimension == 0 && rows > 0 {
        return Err(corrupt(format!("{rows} rows with dimension 0")));
    }
    let expected = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("row count overflow".into()))?;
    if payload.len() != expected {
        return Err(corrupt(format!(
            "expected {expected} payload bytes, found {}",
            payload.len()
        )));
    }

    let values = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(DecodedVectors {
        dimension,
        rows,
        values,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn read_required(path: &Path) -> Result<Vec<u8>, SnapshotError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SnapshotError::Missing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(SnapshotError::Io(e)),
    }
}

impl VectorIndex {
    /// Persist the index into `dir`, replacing any existing snapshot.
    pub fn save(&self, dir: &Path) -> Result<IndexSnapshot, SnapshotError> {
        let dimension = self.dimension().unwrap_or(0);
        let vectors = encode_vectors(dimension, self.len(), self.raw_vectors());
        let vectors_sha256 = sha256_hex(&vectors);
        let created_at = Utc::now();

        let documents = DocumentsFile {
            version: FORMAT_VERSION,
            dimension,
            vectors_sha256: vectors_sha256.clone(),
            created_at,
            documents: self.documents().to_vec(),
        };
        let json = serde_json::to_vec_pretty(&documents).map_err(io::Error::other)?;

        let vectors_path = dir.join(VECTORS_FILE);
        let documents_path = dir.join(DOCUMENTS_FILE);
        let vectors_tmp = stage(&vectors_path, &vectors)?;
        let documents_tmp = stage(&documents_path, &json)?;
        std::fs::rename(&vectors_tmp, &vectors_path)?;
        std::fs::rename(&documents_tmp, &documents_path)?;

        info!(
            path = %dir.display(),
            documents = self.len(),
            dimension,
            bytes = vectors.len(),
            "Index snapshot saved"
        );
        Ok(IndexSnapshot {
            dir: dir.to_path_buf(),
            documents: self.len(),
            dimension,
            vectors_sha256,
            created_at,
        })
    }

    /// Load a snapshot written by [`VectorIndex::save`].
    pub fn load(dir: &Path) -> Result<Self, SnapshotError> {
        let documents_path = dir.join(DOCUMENTS_FILE);
        let vectors_path = dir.join(VECTORS_FILE);

        let documents_bytes = read_required(&documents_path)?;
        let vectors_bytes = read_required(&vectors_path)?;

        let documents: DocumentsFile =
            serde_json::from_slice(&documents_bytes).map_err(|e| SnapshotError::Corrupt {
                path: documents_path.clone(),
                reason: e.to_string(),
            })?;
        if documents.version != FORMAT_VERSION {
            return Err(SnapshotError::Corrupt {
                path: documents_path,
                reason: format!("unsupported format version {}", documents.version),
            });
        }

        let decoded = decode_vectors(&vectors_path, &vectors_bytes)?;
        if sha256_hex(&vectors_bytes) != documents.vectors_sha256 {
            return Err(SnapshotError::Inconsistent {
                reason: format!(
                    "{} does not match the checksum recorded in {}",
                    VECTORS_FILE, DOCUMENTS_FILE
                ),
            });
        }
        if decoded.rows != documents.documents.len() {
            return Err(SnapshotError::Inconsistent {
                reason: format!(
                    "{} documents but {} vectors",
                    documents.documents.len(),
                    decoded.rows
                ),
            });
        }
        if decoded.rows > 0 && decoded.dimension != documents.dimension {
            return Err(SnapshotError::Inconsistent {
                reason: format!(
                    "vector dimension {} but documents record {}",
                    decoded.dimension, documents.dimension
                ),
            });
        }

        let dimension = (decoded.dimension > 0).then_some(decoded.dimension);
        debug!(
            path = %dir.display(),
            rows = decoded.rows,
            dimension = ?dimension,
            "Decoded index snapshot"
        );
        Ok(VectorIndex::from_parts(
            dimension,
            documents.documents,
            decoded.values,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        count: u32,
    }

    fn chunk(source: &str, index: usize) -> Chunk {
        Chunk::new(
            format!("{source} chunk {index}"),
            ChunkMetadata {
                source_id: source.into(),
                title: Some(source.to_uppercase()),
                url: Some(format!("https://docs.example.com/{source}")),
                chunk_index: index,
            },
        )
    }

    fn sample_index(offset: f32) -> VectorIndex {
        let mut index = VectorIndex::new();
        index
            .add(
                vec![chunk("a", 0), chunk("a", 1), chunk("b", 0)],
                vec![
                    vec![offset, 0.5, -1.0],
                    vec![1.0, offset, 2.0],
                    vec![0.25, 0.75, offset],
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let data = TestData {
            name: "hello".into(),
            count: 42,
        };
        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<TestData> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("raw.bin");
        atomic_write(&path, b"hello world").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_load_json_nonexistent() {
        let result: io::Result<Option<TestData>> = load_json(Path::new("/nonexistent/file.json"));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_load_json_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_json::<TestData>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let index = sample_index(0.0);
        let snapshot = index.save(dir.path()).unwrap();
        assert_eq!(snapshot.documents, 3);
        assert_eq!(snapshot.dimension, 3);
        assert!(IndexSnapshot::exists(dir.path()));

        let loaded = VectorIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.documents(), index.documents());
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), Some(3));
        for position in 0..3 {
            assert_eq!(loaded.vector(position), index.vector(position));
        }
    }

    #[test]
    fn test_save_load_empty_index() {
        let dir = TempDir::new().unwrap();
        VectorIndex::new().save(dir.path()).unwrap();
        let loaded = VectorIndex::load(dir.path()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), None);
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = VectorIndex::load(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SnapshotError::Missing { .. }));
        assert!(!IndexSnapshot::exists(dir.path()));
    }

    #[test]
    fn test_load_missing_vectors_file() {
        let dir = TempDir::new().unwrap();
        sample_index(0.0).save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(VECTORS_FILE)).unwrap();
        match VectorIndex::load(dir.path()).unwrap_err() {
            SnapshotError::Missing { path } => assert!(path.ends_with(VECTORS_FILE)),
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn test_load_corrupt_documents() {
        let dir = TempDir::new().unwrap();
        sample_index(0.0).save(dir.path()).unwrap();
        std::fs::write(dir.path().join(DOCUMENTS_FILE), "[1, 2").unwrap();
        let err = VectorIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }

    #[test]
    fn test_load_torn_snapshot_is_inconsistent() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        sample_index(0.0).save(first.path()).unwrap();
        sample_index(9.0).save(second.path()).unwrap();

        std::fs::copy(
            second.path().join(VECTORS_FILE),
            first.path().join(VECTORS_FILE),
        )
        .unwrap();
        let err = VectorIndex::load(first.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Inconsistent { .. }));
    }

    #[test]
    fn test_load_truncated_vectors_is_corrupt() {
        let dir = TempDir::new().unwrap();
        sample_index(0.0).save(dir.path()).unwrap();
        let path = dir.path().join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        match VectorIndex::load(dir.path()).unwrap_err() {
            SnapshotError::Corrupt { path, .. } => assert!(path.ends_with(VECTORS_FILE)),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_load_garbage_vectors_is_corrupt() {
        let dir = TempDir::new().unwrap();
        sample_index(0.0).save(dir.path()).unwrap();
        std::fs::write(dir.path().join(VECTORS_FILE), b"garbage").unwrap();
        let err = VectorIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }), "{err:?}");
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = encode_vectors(2, 1, &[1.0, 2.0]);
        bytes[0] = b'X';
        let err = decode_vectors(Path::new("vectors.bin"), &bytes).err().unwrap();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let bytes = encode_vectors(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let err = decode_vectors(Path::new("vectors.bin"), &bytes[..bytes.len() - 2])
            .err()
            .unwrap();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        sample_index(0.0).save(dir.path()).unwrap();
        let mut bigger = sample_index(1.0);
        bigger
            .add(vec![chunk("c", 0)], vec![vec![3.0, 3.0, 3.0]])
            .unwrap();
        bigger.save(dir.path()).unwrap();
        assert_eq!(VectorIndex::load(dir.path()).unwrap().len(), 4);
        assert!(!dir.path().join("vectors.bin.tmp").exists());
    }
}
