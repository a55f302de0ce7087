//! Chunk registry: the text and metadata the retriever joins results with.
//!
//! In a full deployment the registry is the corpus database owned by the
//! ingestion side; [`InMemoryChunkRegistry`] serves tests, the CLI and
//! embedded use.

use dashmap::DashMap;

use crate::chunk::{ChunkId, ChunkRecord};

/// Lookup of chunk text and metadata by id.
pub trait ChunkRegistry: Send + Sync {
    /// Returns the record for a chunk.
    fn get(&self, chunk_id: ChunkId) -> Option<ChunkRecord>;

    /// Inserts or replaces a record, returning the previous one.
    fn put(&self, record: ChunkRecord) -> Option<ChunkRecord>;

    /// Removes a record.
    fn remove(&self, chunk_id: ChunkId) -> Option<ChunkRecord>;

    /// Number of records.
    fn len(&self) -> usize;

    /// Returns true if there are no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Concurrent in-memory registry.
#[derive(Debug, Default)]
pub struct InMemoryChunkRegistry {
    records: DashMap<ChunkId, ChunkRecord>,
}

impl InMemoryChunkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkRegistry for InMemoryChunkRegistry {
    fn get(&self, chunk_id: ChunkId) -> Option<ChunkRecord> {
        self.records.get(&chunk_id).map(|r| r.value().clone())
    }

    fn put(&self, record: ChunkRecord) -> Option<ChunkRecord> {
        self.records.insert(record.chunk_id, record)
    }

    fn remove(&self, chunk_id: ChunkId) -> Option<ChunkRecord> {
        self.records.remove(&chunk_id).map(|(_, record)| record)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
