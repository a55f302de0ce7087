//! Query cancellation and deadlines.
//!
//! Queries never mutate shared stores, so abandoning one at any stage only
//! drops its per-query buffers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stage of the two-stage query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    /// Sign quantization of the query embedding.
    Quantize,
    /// Hamming candidate search.
    BinarySearch,
    /// Cosine rerank of the candidate pool.
    Rerank,
    /// Join of reranked ids with text and metadata.
    Join,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quantize => "quantize",
            Self::BinarySearch => "binary search",
            Self::Rerank => "rerank",
            Self::Join => "join",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation flag shared between a caller and its query.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-query check of cancellation and deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanGuard<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl<'a> ScanGuard<'a> {
    /// Guard that never interrupts.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Guard over an optional token and deadline.
    #[must_use]
    pub fn new(token: Option<&'a CancellationToken>, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// Fails if the query was cancelled or its deadline passed.
    #[inline]
    pub fn check(&self, stage: QueryStage) -> Result<()> {
        if self.token.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled(stage));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Timeout(stage));
        }
        Ok(())
    }
}
