//! # Bitrank Core
//!
//! Hybrid binary-quantized retrieval engine.
//!
//! Embeddings are sign-quantized to one bit per dimension, searched by
//! Hamming distance to select a candidate pool, then reranked by exact
//! cosine similarity on the full-precision vectors.
//!
//! ## Features
//!
//! - **Binary quantization**: 32x smaller codes, popcount distances
//! - **Filter push-down**: typed metadata filters resolved with posting bitmaps
//! - **Partitioned index**: deterministic Hamming clustering with a recall guard
//! - **Cosine rerank**: scores returned to callers are always cosine similarity
//! - **Snapshots**: checksummed, atomic snapshot and restore
//!
//! ## Quick Start
//!
//! ```rust
//! use bitrank_core::{BitrankConfig, ChunkFilter, ChunkMetadata, DocumentChunk, HybridRetriever};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = BitrankConfig::default();
//!     config.index.dimension = 2;
//!     let retriever = HybridRetriever::from_config(&config)?;
//!
//!     retriever.ingest(DocumentChunk::new(
//!         1,
//!         "charges in an hour",
//!         ChunkMetadata::new().with_product_id("A"),
//!         vec![1.0, 1.0],
//!     ))?;
//!
//!     let response = retriever.query(&[0.9, 0.8], &ChunkFilter::any(), 50, 5)?;
//!     assert_eq!(response.hits[0].chunk_id, 1);
//!     # Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::doc_markdown,
        clippy::uninlined_format_args,
        clippy::cast_lossless,
        clippy::float_cmp
    )
)]

pub mod api;
pub mod backend;
pub mod cancel;
pub mod chunk;
pub mod config;
pub mod distance;
pub mod error;
pub mod filter;
#[cfg(test)]
mod filter_tests;
pub mod float_store;
#[cfg(test)]
mod float_store_tests;
pub mod index;
pub mod metrics;
pub mod quantization;
pub mod registry;
pub mod retriever;
pub mod snapshot;

pub use api::{RetrievalApi, RetrievalRequest, RetrievalResponse};
pub use backend::{BackendWriter, InMemoryBackend, SearchBackend};
pub use cancel::{CancellationToken, QueryStage};
pub use chunk::{ChunkId, ChunkMetadata, ChunkRecord, DocumentChunk};
pub use config::{
    BitrankConfig, ConfigError, IndexConfig, IndexKind, LogFormat, LoggingConfig,
    PartitionParams, SearchConfig,
};
pub use error::{Error, Result};
pub use filter::{ChunkFilter, FilterField};
pub use float_store::{FloatStore, ScoredChunk};
pub use index::{BinaryHit, BinaryIndex, HammingIndex, IndexStats, ReindexOutcome};
pub use metrics::{mrr, precision_at_k, recall_at_k, QualitySample, RecallReport};
pub use quantization::{BinaryCode, BinaryQuantizer};
pub use registry::{ChunkRegistry, InMemoryChunkRegistry};
pub use retriever::{
    HybridRetriever, IngestReport, QueryOptions, QueryResponse, QueryStats, QueryWarning,
    RetrievedChunk,
};
pub use snapshot::Snapshot;
