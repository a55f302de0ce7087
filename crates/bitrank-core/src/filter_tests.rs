//! Tests for typed chunk filters.

use super::filter::{ChunkFilter, FilterField};
use crate::chunk::ChunkMetadata;

#[test]
fn test_empty_filter_matches_everything() {
    let filter = ChunkFilter::any();
    assert!(filter.is_empty());
    assert!(filter.matches(&ChunkMetadata::new()));
    assert!(filter.matches(&ChunkMetadata::new().with_product_id("A")));
}

#[test]
fn test_product_filter() {
    let filter = ChunkFilter::any().with_product_id("A");
    assert!(filter.matches(&ChunkMetadata::new().with_product_id("A")));
    assert!(!filter.matches(&ChunkMetadata::new().with_product_id("B")));
    assert!(!filter.matches(&ChunkMetadata::new()));
}

#[test]
fn test_filter_is_conjunctive() {
    let filter = ChunkFilter::any().with_product_id("A").with_theme("battery");
    let both = ChunkMetadata::new().with_product_id("A").with_theme("battery");
    let one = ChunkMetadata::new().with_product_id("A").with_theme("screen");
    assert!(filter.matches(&both));
    assert!(!filter.matches(&one));
}

#[test]
fn test_attributes_are_not_filterable() {
    let metadata = ChunkMetadata::new()
        .with_source("reviews.csv")
        .with_attribute("rating", "5");
    assert!(ChunkFilter::any().with_source("reviews.csv").matches(&metadata));
    assert!(metadata.filter_tags().attributes.is_empty());
}

#[test]
fn test_constraints_follow_field_order() {
    let filter = ChunkFilter::any().with_source("s").with_product_id("p");
    let fields: Vec<FilterField> = filter.constraints().map(|(f, _)| f).collect();
    assert_eq!(fields, vec![FilterField::ProductId, FilterField::Source]);
}

#[test]
fn test_filter_rejects_unknown_json_fields() {
    let parsed: Result<ChunkFilter, _> = serde_json::from_str(r#"{"color": "red"}"#);
    assert!(parsed.is_err());

    let parsed: ChunkFilter = serde_json::from_str(r#"{"theme": "audio"}"#).unwrap();
    assert_eq!(parsed, ChunkFilter::any().with_theme("audio"));
}
