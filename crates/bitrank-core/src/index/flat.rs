//! Exhaustive Hamming scan over contiguous packed codes.

use std::borrow::Cow;

use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use super::postings::Postings;
use super::{top_by_distance, BinaryHit, HammingIndex, IndexStats, ReindexOutcome};
use crate::cancel::ScanGuard;
use crate::chunk::{ChunkId, ChunkMetadata};
use crate::distance::{hamming_packed, tail_mask};
use crate::error::{Error, Result};
use crate::filter::{ChunkFilter, FilterField};
use crate::quantization::BinaryCode;

/// Flat binary index.
///
/// Codes live in one slot-major buffer. Deletes clear the slot's live bit
/// and leave a tombstone; [`FlatIndex::compact`] rewrites the buffer in
/// slot order, so slot order always equals insertion order.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    code_len: usize,
    tail_mask: u8,
    codes: Vec<u8>,
    ids: Vec<ChunkId>,
    tags: Vec<ChunkMetadata>,
    slots: FxHashMap<ChunkId, u32>,
    live: RoaringBitmap,
    postings: Postings,
}

impl FlatIndex {
    /// Creates an empty index for codes of `dimension` bits.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "index dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            code_len: dimension.div_ceil(8),
            tail_mask: tail_mask(dimension),
            codes: Vec::new(),
            ids: Vec::new(),
            tags: Vec::new(),
            slots: FxHashMap::default(),
            live: RoaringBitmap::new(),
            postings: Postings::default(),
        })
    }

    /// Bytes per code.
    #[must_use]
    pub fn code_len(&self) -> usize {
        self.code_len
    }

    /// Deleted slots awaiting compaction.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.ids.len() - self.slots.len()
    }

    /// Stored code of a chunk.
    #[must_use]
    pub fn code(&self, chunk_id: ChunkId) -> Option<&[u8]> {
        self.slots.get(&chunk_id).map(|&slot| self.slot_code(slot))
    }

    /// Iterates live entries in insertion order as `(id, code, filter tags)`.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkId, &[u8], &ChunkMetadata)> + '_ {
        self.live.iter().map(move |slot| {
            let i = slot as usize;
            (self.ids[i], self.slot_code(slot), &self.tags[i])
        })
    }

    pub(crate) fn slot_of(&self, chunk_id: ChunkId) -> Option<u32> {
        self.slots.get(&chunk_id).copied()
    }

    pub(crate) fn live(&self) -> &RoaringBitmap {
        &self.live
    }

    pub(crate) fn slot_code(&self, slot: u32) -> &[u8] {
        let start = slot as usize * self.code_len;
        &self.codes[start..start + self.code_len]
    }

    pub(crate) fn tail(&self) -> u8 {
        self.tail_mask
    }

    pub(crate) fn check_code(&self, code: &BinaryCode) -> Result<()> {
        if code.dimension() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: code.dimension(),
            });
        }
        if code.byte_len() != self.code_len {
            return Err(Error::CodeLengthMismatch {
                expected: self.code_len,
                actual: code.byte_len(),
            });
        }
        Ok(())
    }

    /// Appends an entry and returns its slot.
    pub(crate) fn insert_slot(
        &mut self,
        chunk_id: ChunkId,
        code: &BinaryCode,
        tags: &ChunkMetadata,
    ) -> Result<u32> {
        self.check_code(code)?;
        if self.slots.contains_key(&chunk_id) {
            return Err(Error::DuplicateId(chunk_id));
        }
        let slot = u32::try_from(self.ids.len())
            .ok()
            .filter(|&slot| slot < u32::MAX)
            .ok_or_else(|| {
                Error::CapacityExceeded(format!(
                    "flat index holds at most {} slots; compact or reindex",
                    u32::MAX
                ))
            })?;

        let tags = tags.filter_tags();
        self.codes.extend_from_slice(code.as_bytes());
        self.ids.push(chunk_id);
        self.postings.insert(slot, &tags);
        self.tags.push(tags);
        self.slots.insert(chunk_id, slot);
        self.live.insert(slot);
        Ok(slot)
    }

    /// Tombstones an entry and returns its former slot.
    pub(crate) fn remove_slot(&mut self, chunk_id: ChunkId) -> Result<u32> {
        let slot = self
            .slots
            .remove(&chunk_id)
            .ok_or(Error::NotFound(chunk_id))?;
        let tags = std::mem::take(&mut self.tags[slot as usize]);
        self.postings.remove(slot, &tags);
        self.live.remove(slot);
        Ok(slot)
    }

    /// Live slots matching `filter`.
    pub(crate) fn candidates(&self, filter: &ChunkFilter) -> Cow<'_, RoaringBitmap> {
        self.postings.restrict(&self.live, filter)
    }

    /// Scans the given slots and keeps the `pool` nearest.
    pub(crate) fn scan(
        &self,
        query: &BinaryCode,
        pool: usize,
        slots: &RoaringBitmap,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        let q = query.as_bytes();
        let ranked = top_by_distance(
            slots.iter(),
            pool,
            |slot| hamming_packed(self.slot_code(slot), q, self.tail_mask),
            guard,
        )?;
        Ok(ranked
            .into_iter()
            .map(|(slot, distance)| BinaryHit {
                chunk_id: self.ids[slot as usize],
                distance,
            })
            .collect())
    }

    /// Drops tombstones, preserving insertion order.
    ///
    /// Returns the old slot of every surviving entry, indexed by new slot.
    pub fn compact(&mut self) -> Vec<u32> {
        let kept: Vec<u32> = self.live.iter().collect();
        if kept.len() == self.ids.len() {
            return kept;
        }

        let mut codes = Vec::with_capacity(kept.len() * self.code_len);
        let mut ids = Vec::with_capacity(kept.len());
        let mut tags = Vec::with_capacity(kept.len());
        for &old in &kept {
            codes.extend_from_slice(self.slot_code(old));
            ids.push(self.ids[old as usize]);
            tags.push(std::mem::take(&mut self.tags[old as usize]));
        }

        self.codes = codes;
        self.ids = ids;
        self.tags = tags;
        self.slots.clear();
        self.live.clear();
        self.postings.clear();
        for (new, (&id, tags)) in (0_u32..).zip(self.ids.iter().zip(&self.tags)) {
            self.slots.insert(id, new);
            self.live.insert(new);
            self.postings.insert(new, tags);
        }

        tracing::debug!(live = kept.len(), "flat index compacted");
        kept
    }

    fn filter_values(&self) -> [usize; 3] {
        FilterField::ALL.map(|field| self.postings.cardinality(field))
    }
}

impl HammingIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert(&mut self, chunk_id: ChunkId, code: BinaryCode, tags: &ChunkMetadata) -> Result<()> {
        self.insert_slot(chunk_id, &code, tags).map(|_| ())
    }

    fn remove(&mut self, chunk_id: ChunkId) -> Result<()> {
        self.remove_slot(chunk_id).map(|_| ())
    }

    fn contains(&self, chunk_id: ChunkId) -> bool {
        self.slots.contains_key(&chunk_id)
    }

    fn search(
        &self,
        query: &BinaryCode,
        pool: usize,
        filter: &ChunkFilter,
        guard: &ScanGuard<'_>,
    ) -> Result<Vec<BinaryHit>> {
        self.check_code(query)?;
        let candidates = self.candidates(filter);
        self.scan(query, pool, &candidates, guard)
    }

    fn reindex(&mut self) -> Result<ReindexOutcome> {
        let before = self.ids.len();
        let kept = self.compact();
        Ok(ReindexOutcome {
            reclaimed: before - kept.len(),
            partitions: 0,
            iterations: 0,
            recall: None,
        })
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: "flat".to_string(),
            dimension: self.dimension,
            code_bytes: self.code_len,
            live: self.len(),
            tombstones: self.tombstones(),
            partitions: 0,
            unassigned: 0,
            degraded: false,
            filter_values: self.filter_values(),
        }
    }
}
