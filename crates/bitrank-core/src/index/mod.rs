//! Binary (Hamming) candidate indexes.
//!
//! [`FlatIndex`] scans every live code and is the exact baseline.
//! [`PartitionedIndex`] clusters codes on explicit reindex and scans only the
//! partitions nearest to the query, trading recall for speed.
//!
//! Both return hits ordered by ascending Hamming distance, ties broken by
//! insertion order, and both apply metadata filters before any distance is
//! computed.

mod flat;
mod partitioned;
mod postings;

#[cfg(test)]
mod partitioned_tests;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

pub use flat::FlatIndex;
pub use partitioned::{PartitionState, PartitionedIndex};

use crate::cancel::{QueryStage, ScanGuard};
use crate::chunk::{ChunkId, ChunkMetadata};
use crate::config::{IndexKind, PartitionParams};
use crate::error::Result;
use crate::filter::ChunkFilter;
use crate::metrics::RecallReport;
use crate::quantization::BinaryCode;

/// Codes scanned between two cancellation checks.
const CHECK_INTERVAL: usize = 4096;

/// A binary-stage candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryHit {
    /// Candidate chunk id.
    pub chunk_id: ChunkId,
    /// Hamming distance to the query code.
    pub distance: u32,
}

/// Result of an explicit reindex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexOutcome {
    /// Tombstoned slots reclaimed by compaction.
    pub reclaimed: usize,
    /// Partitions built (0 for flat indexes).
    pub partitions: usize,
    /// Clustering rounds run.
    pub iterations: usize,
    /// Recall check against the flat scan, if one ran.
    pub recall: Option<RecallReport>,
}

/// Point-in-time index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// `"flat"` or `"partitioned"`.
    pub kind: String,
    /// Embedding dimension.
    pub dimension: usize,
    /// Bytes per code.
    pub code_bytes: usize,
    /// Searchable entries.
    pub live: usize,
    /// Deleted slots not yet compacted.
    pub tombstones: usize,
    /// Built partitions.
    pub partitions: usize,
    /// Entries inserted since the last reindex and not assigned to a partition.
    pub unassigned: usize,
    /// True when partitions failed recall validation and searches scan flat.
    pub degraded: bool,
    /// Distinct filter values per field (`product_id`, `theme`, `source`).
    pub filter_values: [usize; 3],
}

/// Common interface of the binary indexes.
pub trait HammingIndex: Send + Sync {
    /// Dimension of the indexed codes.
    fn dimension(&self) -> usize;

    /// Inserts a code with its filterable metadata.
    ///
    /// Fails with `DuplicateId` if the id is present and with
    /// `DimensionMismatch` if the code has another dimension.
    fn insert(&mut self, chunk_id: ChunkId, code: BinaryCode, tags: &ChunkMetadata) -> Result<()>;

    /// Removes an entry. Fails with `NotFound` if absent.
    fn remove(&mut self, chunk_id: ChunkId) -> Result<()>;

    /// Returns true if the id is present.
    fn contains(&self, chunk_id: ChunkId) -> bool;

    /// Returns at most `pool` hits matching `filter`, ascending by distance.
    fn search(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>>;

    /// Rebuilds derived structures. Never called implicitly.
    fn reindex(&mut self) -> Result<ReindexOutcome>;

    /// Number of searchable entries.
    fn len(&self) -> usize;

    /// Returns true if there are no searchable entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    fn stats(&self) -> IndexStats;
}

/// The binary index owned by a backend.
#[derive(Debug, Clone)]
pub enum BinaryIndex {
    /// Exhaustive scan.
    Flat(FlatIndex),
    /// Partitioned scan.
    Partitioned(PartitionedIndex),
}

impl BinaryIndex {
    /// Creates an empty index of the given layout.
    pub fn new(dimension: usize, kind: IndexKind) -> Result<Self> {
        Ok(match kind {
            IndexKind::Flat => Self::Flat(FlatIndex::new(dimension)?),
            IndexKind::Partitioned(params) => {
                Self::Partitioned(PartitionedIndex::new(dimension, params)?)
            }
        })
    }

    /// Layout of this index.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Flat(_) => IndexKind::Flat,
            Self::Partitioned(index) => IndexKind::Partitioned(*index.params()),
        }
    }

    /// The underlying flat storage.
    #[must_use]
    pub fn storage(&self) -> &FlatIndex {
        match self {
            Self::Flat(index) => index,
            Self::Partitioned(index) => index.storage(),
        }
    }

    /// Compares the partitioned scan with the flat scan.
    ///
    /// Returns `None` for flat indexes or before partitions are built.
    pub fn measure_recall(&self, queries: usize, pool: usize) -> Result<Option<RecallReport>> {
        match self {
            Self::Flat(_) => Ok(None),
            Self::Partitioned(index) => index.measure_recall(queries, pool),
        }
    }

    /// Partition parameters, if partitioned.
    #[must_use]
    pub fn partition_params(&self) -> Option<&PartitionParams> {
        match self {
            Self::Flat(_) => None,
            Self::Partitioned(index) => Some(index.params()),
        }
    }

    fn as_dyn(&self) -> &dyn HammingIndex {
        match self {
            Self::Flat(index) => index,
            Self::Partitioned(index) => index,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn HammingIndex {
        match self {
            Self::Flat(index) => index,
            Self::Partitioned(index) => index,
        }
    }
}

impl HammingIndex for BinaryIndex {
    fn dimension(&self) -> usize {
        self.as_dyn().dimension()
    }

    fn insert(&mut self, chunk_id: ChunkId, code: BinaryCode, tags: &ChunkMetadata) -> Result<()> {
        self.as_dyn_mut().insert(chunk_id, code, tags)
    }

    fn remove(&mut self, chunk_id: ChunkId) -> Result<()> {
        self.as_dyn_mut().remove(chunk_id)
    }

    fn contains(&self, chunk_id: ChunkId) -> bool {
        self.as_dyn().contains(chunk_id)
    }

    fn search(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        self.as_dyn().search(query, pool, filter, guard)
    }

    fn reindex(&mut self) -> Result<ReindexOutcome> {
        self.as_dyn_mut().reindex()
    }

    fn len(&self) -> usize {
        self.as_dyn().len()
    }

    fn stats(&self) -> IndexStats {
        self.as_dyn().stats()
    }
}

/// Heap entry ordered by (distance, slot); the heap top is the worst kept hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ranked {
    distance: u32,
    slot: u32,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `pool` smallest `(distance, slot)` pairs of a slot scan.
///
/// Slots are assigned in insertion order, so equal distances resolve to the
/// earlier insert.
pub(crate) fn top_by_distance(
    slots: impl Iterator<Item = u32>,
    pool: usize,
    mut distance: impl FnMut(u32) -> u32,
    guard: &ScanGuard<'_>,
) -> Result<Vec<(u32, u32)>> {
    if pool == 0 {
        return Ok(Vec::new());
    }

    let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(pool.min(1024) + 1);
    for (scanned, slot) in slots.enumerate() {
        if scanned % CHECK_INTERVAL == 0 {
            guard.check(QueryStage::BinarySearch)?;
        }
        let candidate = Ranked {
            distance: distance(slot),
            slot,
        };
        if heap.len() < pool {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.slot, r.distance))
        .collect())
}
