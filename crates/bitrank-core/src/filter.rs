//! Typed metadata predicates.
//!
//! Filtering is conjunctive over an explicit set of fields so that the
//! binary index can resolve it with posting bitmaps before any distance
//! is computed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMetadata;

/// A metadata field the binary index can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    /// `product_id`
    ProductId,
    /// `theme`
    Theme,
    /// `source`
    Source,
}

impl FilterField {
    /// All filterable fields, in posting-table order.
    pub const ALL: [Self; 3] = [Self::ProductId, Self::Theme, Self::Source];

    /// Position of this field in posting tables.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::ProductId => 0,
            Self::Theme => 1,
            Self::Source => 2,
        }
    }

    /// Field name as it appears in metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductId => "product_id",
            Self::Theme => "theme",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunctive equality filter over the filterable fields.
///
/// An unset field matches any value, including a missing one.
/// The default filter matches every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkFilter {
    /// Required `product_id`.
    pub product_id: Option<String>,
    /// Required `theme`.
    pub theme: Option<String>,
    /// Required `source`.
    pub source: Option<String>,
}

impl ChunkFilter {
    /// Filter that matches everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Requires `product_id` to equal the given value.
    #[must_use]
    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Requires `theme` to equal the given value.
    #[must_use]
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Requires `source` to equal the given value.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the required value for a field, if any.
    #[must_use]
    pub fn get(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::ProductId => self.product_id.as_deref(),
            FilterField::Theme => self.theme.as_deref(),
            FilterField::Source => self.source.as_deref(),
        }
    }

    /// Iterates over the constrained fields.
    pub fn constraints(&self) -> impl Iterator<Item = (FilterField, &str)> + '_ {
        FilterField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
    }

    /// Returns true if no field is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints().next().is_none()
    }

    /// Evaluates the filter against metadata.
    #[must_use]
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.constraints()
            .all(|(field, value)| metadata.field(field) == Some(value))
    }
}
