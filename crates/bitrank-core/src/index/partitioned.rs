//! Partitioned Hamming index.
//!
//! Codes are grouped by a deterministic k-modes clustering in Hamming space:
//! seeds are evenly spaced live entries in insertion order, centroids are
//! per-bit majority votes, and every assignment tie goes to the lowest
//! partition index. Clustering runs only on [`HammingIndex::reindex`]; later
//! inserts join the nearest existing centroid without moving it, and inserts
//! made before the first reindex sit in an unassigned set that every search
//! scans.
//!
//! After clustering, stored codes are replayed as queries against both the
//! partitioned and the flat scan. If mean recall falls below
//! `min_recall`, the index is marked degraded and searches use the flat scan
//! until the next reindex.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::flat::FlatIndex;
use super::{BinaryHit, HammingIndex, IndexStats, ReindexOutcome};
use crate::cancel::ScanGuard;
use crate::chunk::{ChunkId, ChunkMetadata};
use crate::config::PartitionParams;
use crate::distance::hamming_packed;
use crate::error::{Error, Result};
use crate::filter::ChunkFilter;
use crate::metrics::{QualitySample, RecallReport};
use crate::quantization::BinaryCode;

/// Serializable partition layout.
///
/// `assignment` follows the live entries of the index in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Packed centroid codes.
    pub centroids: Vec<Vec<u8>>,
    /// Partition of each live entry, `None` if inserted after the last reindex
    /// with no partitions built.
    pub assignment: Vec<Option<u32>>,
    /// Whether the last recall validation failed.
    pub degraded: bool,
}

/// Binary index that scans only the partitions nearest to the query.
#[derive(Debug, Clone)]
pub struct PartitionedIndex {
    storage: FlatIndex,
    params: PartitionParams,
    centroids: Vec<Vec<u8>>,
    members: Vec<RoaringBitmap>,
    unassigned: RoaringBitmap,
    /// Partition per slot, parallel to the storage slots.
    assignment: Vec<Option<u32>>,
    degraded: bool,
}

impl PartitionedIndex {
    /// Creates an empty partitioned index. No partitions exist until the
    /// first reindex.
    pub fn new(dimension: usize, params: PartitionParams) -> Result<Self> {
        params
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Self {
            storage: FlatIndex::new(dimension)?,
            params,
            centroids: Vec::new(),
            members: Vec::new(),
            unassigned: RoaringBitmap::new(),
            assignment: Vec::new(),
            degraded: false,
        })
    }

    /// Partition parameters.
    #[must_use]
    pub fn params(&self) -> &PartitionParams {
        &self.params
    }

    /// Underlying code storage.
    #[must_use]
    pub fn storage(&self) -> &FlatIndex {
        &self.storage
    }

    /// Number of built partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.centroids.len()
    }

    /// True when searches fall back to the flat scan after failed validation.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Partition a chunk belongs to.
    #[must_use]
    pub fn partition_of(&self, chunk_id: ChunkId) -> Option<u32> {
        let slot = self.storage.slot_of(chunk_id)?;
        self.assignment[slot as usize]
    }

    fn nearest(&self, code: &[u8]) -> u32 {
        nearest_centroid(&self.centroids, code, self.storage.tail())
    }

    /// Partitions to scan for a query, nearest first.
    fn probe_order(&self, query: &[u8]) -> Vec<usize> {
        let tail = self.storage.tail();
        let mut order: Vec<(u32, usize)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(p, centroid)| (hamming_packed(centroid, query, tail), p))
            .collect();
        order.sort_unstable();
        order
            .into_iter()
            .take(self.params.probes)
            .map(|(_, p)| p)
            .collect()
    }

    fn partitions_ready(&self) -> bool {
        !self.centroids.is_empty() && !self.degraded
    }

    fn search_partitions(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        let mut probed = self.unassigned.clone();
        for p in self.probe_order(query.as_bytes()) {
            probed |= &self.members[p];
        }
        probed &= self.storage.candidates(filter).as_ref();
        self.storage.scan(query, pool, &probed, guard)
    }

    /// Replays up to `queries` stored codes against the partitioned and the
    /// flat scan and reports recall, precision and MRR of the partitioned
    /// top-`pool`.
    ///
    /// Returns `None` before partitions are built.
    pub fn measure_recall(&self, queries: usize, pool: usize) -> Result<Option<RecallReport>> {
        if self.centroids.is_empty() {
            return Ok(None);
        }

        let live: Vec<u32> = self.storage.live().iter().collect();
        let samples = queries.min(live.len());
        let guard = ScanGuard::unbounded();
        let filter = ChunkFilter::any();
        let all = self.storage.live();

        let mut quality = Vec::with_capacity(samples);
        for i in 0..samples {
            let slot = live[i * live.len() / samples];
            let query = BinaryCode::from_packed(
                self.storage.slot_code(slot).to_vec(),
                self.storage.dimension(),
            )?;
            let exact: Vec<ChunkId> = self
                .storage
                .scan(&query, pool, all, &guard)?
                .into_iter()
                .map(|hit| hit.chunk_id)
                .collect();
            let approx: Vec<ChunkId> = self
                .search_partitions(&query, pool, &filter, &guard)?
                .into_iter()
                .map(|hit| hit.chunk_id)
                .collect();
            quality.push(QualitySample::measure(&exact, &approx));
        }

        Ok(Some(RecallReport::from_samples(
            &quality,
            pool,
            self.params.min_recall,
        )))
    }

    /// Exports the partition layout in live-entry order.
    #[must_use]
    pub fn partition_state(&self) -> PartitionState {
        PartitionState {
            centroids: self.centroids.clone(),
            assignment: self
                .storage
                .live()
                .iter()
                .map(|slot| self.assignment[slot as usize])
                .collect(),
            degraded: self.degraded,
        }
    }

    /// Installs a previously exported layout over the current live entries.
    pub fn restore_partitions(&mut self, state: PartitionState) -> Result<()> {
        let live: Vec<u32> = self.storage.live().iter().collect();
        if state.assignment.len() != live.len() {
            return Err(Error::Snapshot(format!(
                "partition assignment covers {} entries, index holds {}",
                state.assignment.len(),
                live.len()
            )));
        }
        let code_len = self.storage.code_len();
        if let Some(bad) = state.centroids.iter().find(|c| c.len() != code_len) {
            return Err(Error::CodeLengthMismatch {
                expected: code_len,
                actual: bad.len(),
            });
        }
        let partitions = state.centroids.len();
        if let Some(p) = state
            .assignment
            .iter()
            .flatten()
            .find(|&&p| p as usize >= partitions)
        {
            return Err(Error::Snapshot(format!(
                "entry assigned to partition {p} of {partitions}"
            )));
        }

        self.members = vec![RoaringBitmap::new(); partitions];
        self.unassigned.clear();
        for (&slot, &partition) in live.iter().zip(&state.assignment) {
            self.assignment[slot as usize] = partition;
            match partition {
                Some(p) => {
                    self.members[p as usize].insert(slot);
                }
                None => {
                    self.unassigned.insert(slot);
                }
            }
        }
        self.centroids = state.centroids;
        self.degraded = state.degraded;
        Ok(())
    }

    /// Runs the clustering over the (compacted) live entries.
    fn cluster(&mut self) -> usize {
        let slots: Vec<u32> = self.storage.live().iter().collect();
        let n = slots.len();
        self.members.clear();
        self.unassigned.clear();
        self.centroids.clear();
        if n == 0 {
            return 0;
        }

        let k = self.params.partitions.min(n);
        let tail = self.storage.tail();
        let mut centroids: Vec<Vec<u8>> = (0..k)
            .map(|j| self.storage.slot_code(slots[j * n / k]).to_vec())
            .collect();
        let mut assign = vec![u32::MAX; n];
        let mut iterations = 0;

        loop {
            let mut changed = false;
            for (a, &slot) in assign.iter_mut().zip(&slots) {
                let p = nearest_centroid(&centroids, self.storage.slot_code(slot), tail);
                if *a != p {
                    *a = p;
                    changed = true;
                }
            }
            iterations += 1;
            if !changed || iterations >= self.params.max_iterations {
                break;
            }
            centroids = self.majority_centroids(&centroids, &slots, &assign);
        }

        self.members = vec![RoaringBitmap::new(); k];
        for (&slot, &p) in slots.iter().zip(&assign) {
            self.members[p as usize].insert(slot);
            self.assignment[slot as usize] = Some(p);
        }
        self.centroids = centroids;
        iterations
    }

    /// Per-bit majority vote of each partition's members.
    ///
    /// A tied bit keeps the previous centroid's value; an empty partition
    /// keeps its previous centroid.
    fn majority_centroids(
        &self,
        previous: &[Vec<u8>],
        slots: &[u32],
        assign: &[u32],
    ) -> Vec<Vec<u8>> {
        let dimension = self.storage.dimension();
        let mut ones = vec![vec![0_u32; dimension]; previous.len()];
        let mut sizes = vec![0_u32; previous.len()];

        for (&slot, &p) in slots.iter().zip(assign) {
            let p = p as usize;
            sizes[p] += 1;
            let code = self.storage.slot_code(slot);
            for (bit, count) in ones[p].iter_mut().enumerate() {
                if code[bit / 8] & (0x80 >> (bit % 8)) != 0 {
                    *count += 1;
                }
            }
        }

        previous
            .iter()
            .zip(ones.iter().zip(&sizes))
            .map(|(old, (counts, &size))| {
                if size == 0 {
                    return old.clone();
                }
                let mut centroid = vec![0_u8; old.len()];
                for (bit, &count) in counts.iter().enumerate() {
                    let mask = 0x80 >> (bit % 8);
                    let set = match (2 * count).cmp(&size) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Equal => old[bit / 8] & mask != 0,
                    };
                    if set {
                        centroid[bit / 8] |= mask;
                    }
                }
                centroid
            })
            .collect()
    }
}

/// Index of the centroid nearest to `code`; ties go to the lowest index.
fn nearest_centroid(centroids: &[Vec<u8>], code: &[u8], tail: u8) -> u32 {
    let mut best = (u32::MAX, 0_u32);
    for (p, centroid) in (0_u32..).zip(centroids) {
        let distance = hamming_packed(centroid, code, tail);
        if distance < best.0 {
            best = (distance, p);
        }
    }
    best.1
}

impl HammingIndex for PartitionedIndex {
    fn dimension(&self) -> usize {
        self.storage.dimension()
    }

    fn insert(&mut self, chunk_id: ChunkId, code: BinaryCode, tags: &ChunkMetadata) -> Result<()> {
        let slot = self.storage.insert_slot(chunk_id, &code, tags)?;
        if self.centroids.is_empty() {
            self.unassigned.insert(slot);
            self.assignment.push(None);
        } else {
            let p = self.nearest(code.as_bytes());
            self.members[p as usize].insert(slot);
            self.assignment.push(Some(p));
        }
        Ok(())
    }

    fn remove(&mut self, chunk_id: ChunkId) -> Result<()> {
        let slot = self.storage.remove_slot(chunk_id)?;
        match self.assignment[slot as usize].take() {
            Some(p) => {
                self.members[p as usize].remove(slot);
            }
            None => {
                self.unassigned.remove(slot);
            }
        }
        Ok(())
    }

    fn contains(&self, chunk_id: ChunkId) -> bool {
        self.storage.contains(chunk_id)
    }

    fn search(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        self.storage.check_code(query)?;
        if self.partitions_ready() {
            self.search_partitions(query, pool, filter, guard)
        } else {
            self.storage.search(query, pool, filter, guard)
        }
    }

    fn reindex(&mut self) -> Result<ReindexOutcome> {
        let before = self.storage.len() + self.storage.tombstones();
        let kept = self.storage.compact();
        self.assignment = vec![None; kept.len()];
        let iterations = self.cluster();
        self.degraded = false;

        let recall = if self.params.validation_queries > 0 {
            self.measure_recall(self.params.validation_queries, self.params.validation_pool)?
        } else {
            None
        };
        if let Some(report) = &recall {
            if report.passed {
                tracing::info!(
                    partitions = self.centroids.len(),
                    mean_recall = report.mean_recall,
                    "partitioned index passed recall validation"
                );
            } else {
                self.degraded = true;
                tracing::warn!(
                    partitions = self.centroids.len(),
                    mean_recall = report.mean_recall,
                    threshold = report.threshold,
                    "partitioned recall below threshold, falling back to flat scan"
                );
            }
        }

        Ok(ReindexOutcome {
            reclaimed: before - kept.len(),
            partitions: self.centroids.len(),
            iterations,
            recall,
        })
    }

    fn len(&self) -> usize {
        self.storage.len()
    }

    fn stats(&self) -> IndexStats {
        let mut stats = self.storage.stats();
        stats.kind = "partitioned".to_string();
        stats.partitions = self.centroids.len();
        stats.unassigned = usize::try_from(self.unassigned.len()).unwrap_or(usize::MAX);
        stats.degraded = self.degraded;
        stats
    }
}
