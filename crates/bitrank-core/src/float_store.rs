//! Full-precision embeddings and the cosine reranker.
//!
//! The store is only consulted for the candidate pool of a query; it is
//! never scanned in full.

use std::cmp::Ordering;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;
use crate::distance::{cosine_from_parts, dot_product, l2_norm};
use crate::error::{Error, Result};

/// A reranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct StoredVector {
    values: Box<[f32]>,
    norm: f64,
}

/// Embeddings keyed by chunk id, with norms precomputed at insert time.
#[derive(Debug, Clone)]
pub struct FloatStore {
    dimension: usize,
    vectors: FxHashMap<ChunkId, StoredVector>,
}

impl FloatStore {
    /// Creates an empty store for embeddings of `dimension` components.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: FxHashMap::default(),
        }
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored embeddings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Returns true if an embedding is stored for the id.
    #[must_use]
    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.vectors.contains_key(&chunk_id)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Stores an embedding, replacing any previous one for the id.
    pub fn put(&mut self, chunk_id: ChunkId, embedding: Vec<f32>) -> Result<()> {
        self.check_dimension(&embedding)?;
        let norm = l2_norm(&embedding);
        self.vectors.insert(
            chunk_id,
            StoredVector {
                values: embedding.into_boxed_slice(),
                norm,
            },
        );
        Ok(())
    }

    /// Returns the stored embedding.
    pub fn get(&self, chunk_id: ChunkId) -> Result<&[f32]> {
        self.vectors
            .get(&chunk_id)
            .map(|v| &*v.values)
            .ok_or(Error::NotFound(chunk_id))
    }

    /// Removes and returns the stored embedding.
    pub fn delete(&mut self, chunk_id: ChunkId) -> Result<Vec<f32>> {
        self.vectors
            .remove(&chunk_id)
            .map(|v| v.values.into_vec())
            .ok_or(Error::NotFound(chunk_id))
    }

    /// Scores `candidates` by cosine similarity to `query` and returns the
    /// best `k`, descending.
    ///
    /// Equal scores keep the candidates' input order. Ids missing from the
    /// store are dropped, as are repeated ids after their first occurrence.
    /// A zero-norm query or embedding scores `0.0`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the query has the wrong length.
    pub fn rerank(
        &self,
        query: &[f32],
        candidates: &[ChunkId],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.check_dimension(query)?;
        if k == 0 || candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut seen = FxHashSet::default();
        let mut scored: Vec<ScoredChunk> = candidates
            .iter()
            .filter(|&&id| seen.insert(id))
            .filter_map(|&id| {
                self.vectors.get(&id).map(|v| ScoredChunk {
                    chunk_id: id,
                    score: cosine_from_parts(dot_product(query, &v.values), query_norm, v.norm),
                })
            })
            .collect();

        // `sort_by` is stable: ties keep the binary-stage order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
