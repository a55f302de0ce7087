//! Posting bitmaps for filter push-down.

use std::borrow::Cow;

use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::chunk::ChunkMetadata;
use crate::filter::{ChunkFilter, FilterField};

/// Slot bitmaps keyed by (field, value).
#[derive(Debug, Clone, Default)]
pub(crate) struct Postings {
    by_field: [FxHashMap<String, RoaringBitmap>; 3],
}

impl Postings {
    pub(crate) fn insert(&mut self, slot: u32, tags: &ChunkMetadata) {
        for field in FilterField::ALL {
            if let Some(value) = tags.field(field) {
                self.by_field[field.ordinal()]
                    .entry(value.to_string())
                    .or_default()
                    .insert(slot);
            }
        }
    }

    pub(crate) fn remove(&mut self, slot: u32, tags: &ChunkMetadata) {
        for field in FilterField::ALL {
            let Some(value) = tags.field(field) else {
                continue;
            };
            let table = &mut self.by_field[field.ordinal()];
            if let Some(bitmap) = table.get_mut(value) {
                bitmap.remove(slot);
                if bitmap.is_empty() {
                    table.remove(value);
                }
            }
        }
    }

    /// Narrows `live` to the slots matching every constraint of `filter`.
    ///
    /// A constrained value with no posting yields an empty set.
    pub(crate) fn restrict<'a>(
        &self,
        live: &'a RoaringBitmap,
        filter: &ChunkFilter,
    ) -> Cow<'a, RoaringBitmap> {
        if filter.is_empty() {
            return Cow::Borrowed(live);
        }
        let mut candidates = live.clone();
        for (field, value) in filter.constraints() {
            match self.by_field[field.ordinal()].get(value) {
                Some(bitmap) => candidates &= bitmap,
                None => return Cow::Owned(RoaringBitmap::new()),
            }
            if candidates.is_empty() {
                break;
            }
        }
        Cow::Owned(candidates)
    }

    pub(crate) fn clear(&mut self) {
        for table in &mut self.by_field {
            table.clear();
        }
    }

    /// Number of distinct values indexed for a field.
    pub(crate) fn cardinality(&self, field: FilterField) -> usize {
        self.by_field[field.ordinal()].len()
    }
}
