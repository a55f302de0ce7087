//! Hybrid two-stage retrieval.
//!
//! A query runs four stages:
//! 1. sign-quantize the query embedding,
//! 2. Hamming search for a filtered candidate pool of `M`,
//! 3. cosine rerank of the pool down to `K`,
//! 4. join the reranked ids with text and metadata from the registry.
//!
//! The score returned to callers is always the stage-3 cosine similarity;
//! Hamming distances only select candidates. Chunks missing from the float
//! store or the registry are skipped, never fatal.

use std::path::Path;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{BackendWriter, InMemoryBackend, SearchBackend};
use crate::cancel::{CancellationToken, QueryStage, ScanGuard};
use crate::chunk::{ChunkId, ChunkMetadata, ChunkRecord, DocumentChunk};
use crate::config::{BitrankConfig, SearchConfig};
use crate::error::{Error, Result};
use crate::filter::ChunkFilter;
use crate::index::{IndexStats, ReindexOutcome};
use crate::metrics::RecallReport;
use crate::quantization::BinaryQuantizer;
use crate::registry::{ChunkRegistry, InMemoryChunkRegistry};
use crate::snapshot::Snapshot;

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Metadata filter, applied at the binary stage.
    pub filter: ChunkFilter,
    /// Result count `K`; the configured default when `None`.
    pub top_k: Option<usize>,
    /// Candidate pool `M`; derived from `K` by the pool policy when `None`.
    pub candidate_pool: Option<usize>,
    /// Caller-side cancellation.
    pub cancel: Option<CancellationToken>,
    /// Time budget for the whole query.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// Options for `top_k` results with the default pool policy.
    #[must_use]
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k: Some(top_k),
            ..Self::default()
        }
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ChunkFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets an explicit candidate pool.
    #[must_use]
    pub fn with_candidate_pool(mut self, pool: usize) -> Self {
        self.candidate_pool = Some(pool);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets a time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Non-fatal conditions worth surfacing to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryWarning {
    /// `M < K`: at most `pool` results can be returned.
    PoolSmallerThanTopK {
        /// Candidate pool `M`.
        pool: usize,
        /// Requested result count `K`.
        top_k: usize,
    },
}

impl std::fmt::Display for QueryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolSmallerThanTopK { pool, top_k } => {
                write!(f, "candidate pool {pool} is smaller than top_k {top_k}")
            }
        }
    }
}

/// Per-query counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryStats {
    /// Candidate pool `M` requested from the binary stage.
    pub pool_size: usize,
    /// Candidates the binary stage returned.
    pub candidates: usize,
    /// Candidates scored by the rerank.
    pub reranked: usize,
    /// Results lost because the float store or the registry lacked them.
    pub dropped_missing: usize,
    /// Wall time of the query.
    pub elapsed_us: u64,
}

/// Ranked results plus diagnostics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Results, best first.
    pub hits: Vec<RetrievedChunk>,
    /// Counters.
    pub stats: QueryStats,
    /// Warnings.
    pub warnings: Vec<QueryWarning>,
}

/// Outcome of a batch ingest.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Chunks registered.
    pub inserted: usize,
    /// Chunks rejected, with the reason.
    pub failed: Vec<(ChunkId, Error)>,
}

impl IngestReport {
    /// Returns true if every chunk was registered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Two-stage retriever over a binary index, a float store and a chunk registry.
#[derive(Debug)]
pub struct HybridRetriever<B = InMemoryBackend, R = InMemoryChunkRegistry> {
    quantizer: BinaryQuantizer,
    search: SearchConfig,
    backend: B,
    registry: R,
}

impl HybridRetriever {
    /// Creates an empty in-memory retriever from configuration.
    pub fn from_config(config: &BitrankConfig) -> Result<Self> {
        config.validate()?;
        let backend = InMemoryBackend::new(config.index.dimension, config.index.kind)?;
        Self::with_parts(
            config.index.dimension,
            config.search,
            backend,
            InMemoryChunkRegistry::new(),
        )
    }

    /// Restores an in-memory retriever from a snapshot.
    pub fn restore(snapshot: Snapshot, search: SearchConfig) -> Result<Self> {
        snapshot.validate()?;
        let backend = InMemoryBackend::import(snapshot.dimension, &snapshot.entries, snapshot.index)?;
        let registry = InMemoryChunkRegistry::new();
        for entry in snapshot.entries {
            if let Some(text) = entry.text {
                registry.put(ChunkRecord {
                    chunk_id: entry.chunk_id,
                    text,
                    metadata: entry.metadata,
                });
            }
        }
        info!(
            dimension = snapshot.dimension,
            chunks = backend.len(),
            "retriever restored from snapshot"
        );
        Self::with_parts(snapshot.dimension, search, backend, registry)
    }

    /// Reads a snapshot file and restores from it.
    pub fn load(path: &Path, search: SearchConfig) -> Result<Self> {
        Self::restore(Snapshot::read_from(path)?, search)
    }
}

impl<R: ChunkRegistry> HybridRetriever<InMemoryBackend, R> {
    /// Captures all stores in one snapshot.
    ///
    /// Text and full metadata come from the registry when it has them.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let (mut entries, index) = self.backend.export();
        for entry in &mut entries {
            if let Some(record) = self.registry.get(entry.chunk_id) {
                entry.text = Some(record.text);
                entry.metadata = record.metadata;
            }
        }
        Snapshot {
            dimension: self.quantizer.dimension(),
            index,
            entries,
        }
    }

    /// Writes a snapshot file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.snapshot().write_to(path)
    }

    /// Compares the partitioned scan with the flat scan on stored codes.
    pub fn measure_recall(&self, queries: usize, pool: usize) -> Result<Option<RecallReport>> {
        self.backend.measure_recall(queries, pool)
    }
}

impl<B, R> HybridRetriever<B, R>
where
    B: SearchBackend + BackendWriter,
    R: ChunkRegistry,
{
    /// Assembles a retriever from its collaborators.
    pub fn with_parts(
        dimension: usize,
        search: SearchConfig,
        backend: B,
        registry: R,
    ) -> Result<Self> {
        search.validate()?;
        if backend.dimension() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: backend.dimension(),
            });
        }
        Ok(Self {
            quantizer: BinaryQuantizer::new(dimension)?,
            search,
            backend,
            registry,
        })
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.quantizer.dimension()
    }

    /// Query-time configuration.
    #[must_use]
    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// The storage backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The chunk registry.
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Registers a chunk in the binary index, the float store and the
    /// registry.
    ///
    /// Fails with `DimensionMismatch` or `DuplicateId` without touching any
    /// store.
    pub fn ingest(&self, chunk: DocumentChunk) -> Result<()> {
        let DocumentChunk {
            chunk_id,
            text,
            metadata,
            embedding,
        } = chunk;

        let code = self.quantizer.quantize(&embedding)?;
        self.backend.insert(chunk_id, code, embedding, &metadata)?;
        self.registry.put(ChunkRecord {
            chunk_id,
            text,
            metadata,
        });
        debug!(chunk_id, "chunk ingested");
        Ok(())
    }

    /// Ingests chunks one by one; failures are collected, not retried.
    pub fn ingest_batch(&self, chunks: impl IntoIterator<Item = DocumentChunk>) -> IngestReport {
        let mut report = IngestReport::default();
        for chunk in chunks {
            let chunk_id = chunk.chunk_id;
            match self.ingest(chunk) {
                Ok(()) => report.inserted += 1,
                Err(err) => {
                    warn!(chunk_id, error = %err, "chunk rejected");
                    report.failed.push((chunk_id, err));
                }
            }
        }
        info!(
            inserted = report.inserted,
            failed = report.failed.len(),
            "batch ingest finished"
        );
        report
    }

    /// Removes a chunk from every store.
    ///
    /// Fails with `NotFound` only if no store held it.
    pub fn remove(&self, chunk_id: ChunkId) -> Result<()> {
        let in_backend = self.backend.remove(chunk_id);
        let in_registry = self.registry.remove(chunk_id).is_some();
        match in_backend {
            Err(Error::NotFound(_)) if in_registry => Ok(()),
            other => other,
        }
    }

    /// Rebuilds the binary index (compaction, partitions, recall check).
    pub fn reindex(&self) -> Result<ReindexOutcome> {
        self.backend.reindex()
    }

    /// Binary index statistics.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.backend.stats()
    }

    /// Two-stage query with an explicit candidate pool `M` and result count `K`.
    pub fn query(
        &self,
        embedding: &[f32],
        filter: &ChunkFilter,
        pool: usize,
        top_k: usize,
    ) -> Result<QueryResponse> {
        self.run(embedding, filter, pool, top_k, &ScanGuard::unbounded())
    }

    /// Two-stage query driven by [`QueryOptions`].
    pub fn query_with(&self, embedding: &[f32], options: &QueryOptions) -> Result<QueryResponse> {
        let top_k = options.top_k.unwrap_or(self.search.default_top_k);
        let pool = options
            .candidate_pool
            .unwrap_or_else(|| self.search.candidate_pool(top_k));
        let deadline = options
            .timeout
            .and_then(|t| Instant::now().checked_add(t));
        let guard = ScanGuard::new(options.cancel.as_ref(), deadline);
        self.run(embedding, &options.filter, pool, top_k, &guard)
    }

    /// Runs independent queries in parallel.
    pub fn query_batch(&self, queries: &[(Vec<f32>, QueryOptions)]) -> Vec<Result<QueryResponse>> {
        queries
            .par_iter()
            .map(|(embedding, options)| self.query_with(embedding, options))
            .collect()
    }

    fn run(
        &self,
        embedding: &[f32],
        filter: &ChunkFilter,
        pool: usize,
        top_k: usize,
        guard: &ScanGuard<'_>,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let mut response = QueryResponse::default();
        response.stats.pool_size = pool;

        guard.check(QueryStage::Quantize)?;
        let code = self.quantizer.quantize(embedding)?;

        if pool < top_k {
            warn!(pool, top_k, "candidate pool smaller than top_k");
            response
                .warnings
                .push(QueryWarning::PoolSmallerThanTopK { pool, top_k });
        }

        guard.check(QueryStage::BinarySearch)?;
        let candidates: Vec<ChunkId> = self
            .backend
            .search_binary(&code, pool, filter, guard)?
            .into_iter()
            .map(|hit| hit.chunk_id)
            .collect();
        response.stats.candidates = candidates.len();

        guard.check(QueryStage::Rerank)?;
        let reranked = self.backend.search_float(embedding, &candidates, top_k)?;
        response.stats.reranked = reranked.len();
        response.stats.dropped_missing = top_k.min(candidates.len()).saturating_sub(reranked.len());

        guard.check(QueryStage::Join)?;
        response.hits.reserve(reranked.len());
        for scored in reranked {
            match self.registry.get(scored.chunk_id) {
                Some(record) => response.hits.push(RetrievedChunk {
                    chunk_id: scored.chunk_id,
                    text: record.text,
                    metadata: record.metadata,
                    score: scored.score,
                }),
                None => {
                    debug!(chunk_id = scored.chunk_id, "chunk missing from registry, skipped");
                    response.stats.dropped_missing += 1;
                }
            }
        }

        response.stats.elapsed_us =
            u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        debug!(
            pool,
            top_k,
            candidates = response.stats.candidates,
            results = response.hits.len(),
            elapsed_us = response.stats.elapsed_us,
            "query served"
        );
        Ok(response)
    }
}
