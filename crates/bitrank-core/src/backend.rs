//! Storage backend capability traits and the in-memory backend.
//!
//! The retriever depends only on [`SearchBackend`] for reads and
//! [`BackendWriter`] for corpus management, so a different vector store can
//! be plugged in by implementing these two traits.

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::cancel::ScanGuard;
use crate::chunk::{ChunkId, ChunkMetadata};
use crate::config::IndexKind;
use crate::error::{Error, Result};
use crate::filter::ChunkFilter;
use crate::float_store::{FloatStore, ScoredChunk};
use crate::index::{BinaryHit, BinaryIndex, HammingIndex, IndexStats, ReindexOutcome};
use crate::metrics::RecallReport;
use crate::quantization::BinaryCode;
use crate::snapshot::{SnapshotEntry, SnapshotIndex};

/// Read capabilities needed by the two-stage query.
pub trait SearchBackend: Send + Sync {
    /// Embedding dimension served by this backend.
    fn dimension(&self) -> usize;

    /// Hamming candidate search, filter applied before ranking.
    fn search_binary(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>>;

    /// Cosine rerank of candidates; missing ids are dropped.
    fn search_float(
        &self,
        query: &[f32],
        candidates: &[ChunkId],
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Write capabilities for corpus management.
pub trait BackendWriter: Send + Sync {
    /// Registers a chunk's code and embedding.
    ///
    /// Fails with `DuplicateId` if the chunk is present in either store.
    fn insert(
        &self,
        chunk_id: ChunkId,
        code: BinaryCode,
        embedding: Vec<f32>,
        metadata: &ChunkMetadata,
    ) -> Result<()>;

    /// Removes a chunk from both stores.
    ///
    /// Fails with `NotFound` only if neither store held it.
    fn remove(&self, chunk_id: ChunkId) -> Result<()>;

    /// Compacts and rebuilds the binary index.
    fn reindex(&self) -> Result<ReindexOutcome>;

    /// Binary index statistics.
    fn stats(&self) -> IndexStats;
}

/// Process-local backend: one binary index and one float store, each behind
/// its own reader-writer lock.
///
/// Writers take the binary lock before the float lock, so a reader never
/// sees a half-written entry in either store.
#[derive(Debug)]
pub struct InMemoryBackend {
    binary: RwLock<BinaryIndex>,
    floats: RwLock<FloatStore>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new(dimension: usize, kind: IndexKind) -> Result<Self> {
        let binary = BinaryIndex::new(dimension, kind)?;
        info!(dimension, kind = ?kind, "in-memory backend created");
        Ok(Self {
            binary: RwLock::new(binary),
            floats: RwLock::new(FloatStore::new(dimension)),
        })
    }

    /// Number of chunks in the binary index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.binary.read().len()
    }

    /// Returns true if the binary index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of embeddings in the float store.
    #[must_use]
    pub fn float_len(&self) -> usize {
        self.floats.read().len()
    }

    /// Layout of the binary index.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        self.binary.read().kind()
    }

    /// Returns true if the binary index holds the chunk.
    #[must_use]
    pub fn contains_binary(&self, chunk_id: ChunkId) -> bool {
        self.binary.read().contains(chunk_id)
    }

    /// Returns true if the float store holds the chunk.
    #[must_use]
    pub fn contains_float(&self, chunk_id: ChunkId) -> bool {
        self.floats.read().contains(chunk_id)
    }

    /// Copy of a stored embedding.
    pub fn embedding(&self, chunk_id: ChunkId) -> Result<Vec<f32>> {
        self.floats.read().get(chunk_id).map(<[f32]>::to_vec)
    }

    /// Removes a chunk from the binary index only.
    pub fn remove_binary(&self, chunk_id: ChunkId) -> Result<()> {
        self.binary.write().remove(chunk_id)
    }

    /// Removes a chunk from the float store only.
    pub fn remove_float(&self, chunk_id: ChunkId) -> Result<Vec<f32>> {
        self.floats.write().delete(chunk_id)
    }

    /// Compares partitioned and flat scans on stored codes.
    pub fn measure_recall(&self, queries: usize, pool: usize) -> Result<Option<RecallReport>> {
        self.binary.read().measure_recall(queries, pool)
    }

    /// Exports index entries in insertion order, with their embeddings when
    /// the float store has them, under one consistent read of both stores.
    pub(crate) fn export(&self) -> (Vec<SnapshotEntry>, SnapshotIndex) {
        let binary = self.binary.read();
        let floats = self.floats.read();

        let entries = binary
            .storage()
            .iter()
            .map(|(chunk_id, code, tags)| SnapshotEntry {
                chunk_id,
                code: code.to_vec(),
                embedding: floats.get(chunk_id).ok().map(<[f32]>::to_vec),
                text: None,
                metadata: tags.clone(),
            })
            .collect();

        let index = match &*binary {
            BinaryIndex::Flat(_) => SnapshotIndex::Flat,
            BinaryIndex::Partitioned(index) => SnapshotIndex::Partitioned {
                params: *index.params(),
                state: index.partition_state(),
            },
        };
        (entries, index)
    }

    /// Rebuilds a backend from exported entries.
    pub(crate) fn import(
        dimension: usize,
        entries: &[SnapshotEntry],
        index: SnapshotIndex,
    ) -> Result<Self> {
        let (kind, state) = match index {
            SnapshotIndex::Flat => (IndexKind::Flat, None),
            SnapshotIndex::Partitioned { params, state } => {
                (IndexKind::Partitioned(params), Some(state))
            }
        };
        let mut binary = BinaryIndex::new(dimension, kind)?;
        let mut floats = FloatStore::new(dimension);

        for entry in entries {
            let code = BinaryCode::from_packed(entry.code.clone(), dimension)?;
            binary.insert(entry.chunk_id, code, &entry.metadata)?;
            if let Some(embedding) = &entry.embedding {
                floats.put(entry.chunk_id, embedding.clone())?;
            }
        }
        if let (BinaryIndex::Partitioned(index), Some(state)) = (&mut binary, state) {
            index.restore_partitions(state)?;
        }

        Ok(Self {
            binary: RwLock::new(binary),
            floats: RwLock::new(floats),
        })
    }
}

impl SearchBackend for InMemoryBackend {
    fn dimension(&self) -> usize {
        self.floats.read().dimension()
    }

    fn search_binary(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        self.binary.read().search(query, pool, filter, guard)
    }

    fn search_float(
        &self,
        query: &[f32],
        candidates: &[ChunkId],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.floats.read().rerank(query, candidates, k)
    }
}

impl BackendWriter for InMemoryBackend {
    fn insert(
        &self,
        chunk_id: ChunkId,
        code: BinaryCode,
        embedding: Vec<f32>,
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        let mut binary = self.binary.write();
        let mut floats = self.floats.write();

        if embedding.len() != floats.dimension() {
            return Err(Error::DimensionMismatch {
                expected: floats.dimension(),
                actual: embedding.len(),
            });
        }
        if floats.contains(chunk_id) {
            return Err(Error::DuplicateId(chunk_id));
        }
        binary.insert(chunk_id, code, metadata)?;
        floats.put(chunk_id, embedding)
    }

    fn remove(&self, chunk_id: ChunkId) -> Result<()> {
        let mut binary = self.binary.write();
        let mut floats = self.floats.write();

        let in_binary = binary.remove(chunk_id).is_ok();
        let in_floats = floats.delete(chunk_id).is_ok();
        if !in_binary && !in_floats {
            return Err(Error::NotFound(chunk_id));
        }
        if in_binary != in_floats {
            debug!(chunk_id, in_binary, in_floats, "removed partially stored chunk");
        }
        Ok(())
    }

    fn reindex(&self) -> Result<ReindexOutcome> {
        let outcome = self.binary.write().reindex()?;
        info!(
            reclaimed = outcome.reclaimed,
            partitions = outcome.partitions,
            iterations = outcome.iterations,
            "binary index rebuilt"
        );
        Ok(outcome)
    }

    fn stats(&self) -> IndexStats {
        self.binary.read().stats()
    }
}
