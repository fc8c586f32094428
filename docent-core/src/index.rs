//! Exact nearest-neighbor vector index.
//!
//! Rows pair the Nth chunk with the Nth vector; position is the only link
//! between the two. Vectors are stored flat in row-major order and searched
//! by brute-force squared Euclidean distance.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use crate::error::{IndexError, SnapshotError};
use crate::types::{Chunk, SearchResult};

/// In-memory index of chunks and their embedding vectors.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    documents: Vec<Chunk>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index whose dimension is set by the first `add`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with a fixed dimension.
    pub fn with_dimension(dimension: usize) -> Result<Self, IndexError> {
        let mut index = Self::new();
        index.initialize(dimension)?;
        Ok(index)
    }

    /// Rebuild an index from already-validated snapshot parts.
    pub(crate) fn from_parts(
        dimension: Option<usize>,
        documents: Vec<Chunk>,
        vectors: Vec<f32>,
    ) -> Self {
        Self {
            dimension,
            documents,
            vectors,
        }
    }

    /// Fix the vector dimension. Setting the same dimension again is a no-op.
    pub fn initialize(&mut self, dimension: usize) -> Result<(), IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension(dimension));
        }
        match self.dimension {
            Some(existing) if existing != dimension => Err(IndexError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    /// Append chunks and their vectors. All-or-nothing: on any error the
    /// index is unchanged.
    pub fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize, IndexError> {
        if let Err(e) = self.validate_batch(&chunks, &vectors) {
            warn!(
                chunks = chunks.len(),
                vectors = vectors.len(),
                dimension = ?self.dimension,
                error = %e,
                "Rejected index batch"
            );
            return Err(e);
        }

        let added = chunks.len();
        if self.dimension.is_none() {
            self.dimension = vectors.first().map(Vec::len);
        }
        self.vectors.reserve(vectors.iter().map(Vec::len).sum());
        for v in &vectors {
            self.vectors.extend_from_slice(v);
        }
        self.documents.extend(chunks);
        debug!(added, total = self.documents.len(), "Added rows to index");
        Ok(added)
    }

    fn validate_batch(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if chunks.is_empty() || vectors.is_empty() {
            return Err(IndexError::EmptyBatch);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let expected = match self.dimension {
            Some(d) => d,
            None => vectors[0].len(),
        };
        if expected == 0 {
            return Err(IndexError::InvalidDimension(0));
        }
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: v.len(),
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(IndexError::NonFiniteValue { row });
            }
        }
        Ok(())
    }

    /// Return the `k` nearest rows to `query`, closest first.
    ///
    /// Ties keep insertion order. An empty index returns no results for any
    /// query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        let Some(dimension) = self.dimension.filter(|_| !self.documents.is_empty()) else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.documents.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .chunks_exact(dimension)
            .enumerate()
            .filter_map(|(position, row)| {
                let distance = squared_l2(query, row);
                distance.is_finite().then_some((distance, position))
            })
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, position)| SearchResult {
                chunk: self.documents[position].clone(),
                distance,
                position,
            })
            .collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn documents(&self) -> &[Chunk] {
        &self.documents
    }

    /// The stored vector at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        if position >= self.documents.len() {
            return None;
        }
        let start = position * dimension;
        self.vectors.get(start..start + dimension)
    }

    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Shared, atomically replaceable handle to the serving index.
///
/// Readers take an `Arc` snapshot and keep using it even if a reload swaps
/// in a new index underneath them.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: ArcSwapOption<VectorIndex>,
}

impl IndexHandle {
    /// A handle with no index loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(index),
        }
    }

    /// The current index, or `None` while none is available.
    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current.load_full()
    }

    /// Publish `index`, returning the one it replaced.
    pub fn replace(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        self.current.swap(Some(Arc::new(index)))
    }

    /// Load a snapshot from `dir` and swap it in. The previous index stays
    /// published if loading fails.
    pub fn load_from(&self, dir: &Path) -> Result<Arc<VectorIndex>, SnapshotError> {
        match VectorIndex::load(dir) {
            Ok(index) => {
                let index = Arc::new(index);
                self.current.store(Some(Arc::clone(&index)));
                info!(
                    path = %dir.display(),
                    documents = index.len(),
                    dimension = ?index.dimension(),
                    "Index loaded"
                );
                Ok(index)
            }
            Err(e) => {
                warn!(
                    path = %dir.display(),
                    error = %e,
                    kept_previous = self.current.load().is_some(),
                    "Index load failed"
                );
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }
}
