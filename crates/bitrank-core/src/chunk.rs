//! Retrievable chunk types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::FilterField;

/// Stable chunk identifier assigned at ingestion and never reused.
pub type ChunkId = u64;

/// Metadata attached to a chunk.
///
/// The typed fields are the ones the binary index can filter on.
/// `attributes` travel with results but are never pushed down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    /// Product the chunk belongs to.
    pub product_id: Option<String>,
    /// Theme or topic label.
    pub theme: Option<String>,
    /// Origin of the chunk (file, feed, review source...).
    pub source: Option<String>,
    /// Free-form attributes, not filterable.
    pub attributes: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the product id.
    #[must_use]
    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Sets the theme.
    #[must_use]
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a filterable field.
    #[must_use]
    pub fn field(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::ProductId => self.product_id.as_deref(),
            FilterField::Theme => self.theme.as_deref(),
            FilterField::Source => self.source.as_deref(),
        }
    }

    /// Returns a copy holding only the filterable fields.
    #[must_use]
    pub fn filter_tags(&self) -> Self {
        Self {
            product_id: self.product_id.clone(),
            theme: self.theme.clone(),
            source: self.source.clone(),
            attributes: BTreeMap::new(),
        }
    }
}

/// A unit of retrievable text as handed over by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk id.
    pub chunk_id: ChunkId,
    /// Raw chunk content.
    pub text: String,
    /// Filterable and free-form metadata.
    #[serde(default)]
    pub metadata: ChunkMetadata,
    /// Full-precision embedding of dimension `D`.
    pub embedding: Vec<f32>,
}

impl DocumentChunk {
    /// Creates a new chunk.
    #[must_use]
    pub fn new(
        chunk_id: ChunkId,
        text: impl Into<String>,
        metadata: ChunkMetadata,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            chunk_id,
            text: text.into(),
            metadata,
            embedding,
        }
    }
}

/// Text and metadata of a chunk, as held by the chunk registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// Raw chunk content.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}
