//! Request and response types at the result boundary.
//!
//! The generation layer sends a [`RetrievalRequest`] and receives ranked
//! chunks in a [`RetrievalResponse`]. Both are plain serde types so they can
//! travel over any transport the caller chooses.

use serde::{Deserialize, Serialize};

use crate::backend::{BackendWriter, SearchBackend};
use crate::error::Result;
use crate::filter::ChunkFilter;
use crate::registry::ChunkRegistry;
use crate::retriever::{HybridRetriever, QueryOptions, QueryWarning, RetrievedChunk};

/// A retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Query embedding of dimension `D`.
    pub embedding: Vec<f32>,
    /// Metadata filter; empty means no restriction.
    #[serde(default)]
    pub filters: ChunkFilter,
    /// Result count; the configured default when absent.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Candidate pool; derived from `top_k` when absent.
    #[serde(default)]
    pub candidate_pool: Option<usize>,
}

impl RetrievalRequest {
    /// A request with default filter, `top_k` and pool.
    #[must_use]
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            filters: ChunkFilter::default(),
            top_k: None,
            candidate_pool: None,
        }
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filters(mut self, filters: ChunkFilter) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the result count.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            filter: self.filters.clone(),
            top_k: self.top_k,
            candidate_pool: self.candidate_pool,
            ..QueryOptions::default()
        }
    }
}

/// Ranked results for a [`RetrievalRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// Results, best first; `score` is the cosine similarity.
    pub results: Vec<RetrievedChunk>,
    /// Non-fatal conditions, such as a pool smaller than `top_k`.
    #[serde(default)]
    pub warnings: Vec<QueryWarning>,
}

/// Serves retrieval requests.
pub trait RetrievalApi: Send + Sync {
    /// Runs one request.
    fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse>;
}

impl<B, R> RetrievalApi for HybridRetriever<B, R>
where
    B: SearchBackend + BackendWriter,
    R: ChunkRegistry,
{
    fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let response = self.query_with(&request.embedding, &request.options())?;
        Ok(RetrievalResponse {
            results: response.hits,
            warnings: response.warnings,
        })
    }
}
