//! Tests for the partitioned Hamming index.

use super::{FlatIndex, HammingIndex, PartitionedIndex};
use crate::cancel::ScanGuard;
use crate::chunk::{ChunkId, ChunkMetadata};
use crate::config::PartitionParams;
use crate::error::Error;
use crate::filter::ChunkFilter;
use crate::quantization::{BinaryCode, BinaryQuantizer};

fn code(bits: &str) -> BinaryCode {
    let values: Vec<f32> = bits
        .chars()
        .map(|c| if c == '1' { 1.0 } else { -1.0 })
        .collect();
    BinaryQuantizer::new(values.len())
        .unwrap()
        .quantize(&values)
        .unwrap()
}

fn params(probes: usize, validation_pool: usize) -> PartitionParams {
    PartitionParams {
        partitions: 2,
        probes,
        max_iterations: 10,
        min_recall: 0.9,
        validation_queries: 6,
        validation_pool,
    }
}

/// Two well separated groups: ids 1..=3 near all-zeros, 4..=6 near all-ones.
const CORPUS: [(ChunkId, &str); 6] = [
    (1, "00000000"),
    (2, "00000001"),
    (3, "00000011"),
    (4, "11111111"),
    (5, "11111110"),
    (6, "11111100"),
];

fn build(params: PartitionParams) -> PartitionedIndex {
    let mut index = PartitionedIndex::new(8, params).unwrap();
    for (id, bits) in CORPUS {
        let product = if id <= 3 { "A" } else { "B" };
        index
            .insert(id, code(bits), &ChunkMetadata::new().with_product_id(product))
            .unwrap();
    }
    index
}

fn ids(index: &impl HammingIndex, query: &str, pool: usize, filter: &ChunkFilter) -> Vec<ChunkId> {
    index
        .search(&code(query), pool, filter, &ScanGuard::unbounded())
        .unwrap()
        .into_iter()
        .map(|hit| hit.chunk_id)
        .collect()
}

#[test]
fn test_new_validates_params() {
    let mut bad = params(1, 3);
    bad.probes = 3;
    assert!(matches!(
        PartitionedIndex::new(8, bad),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_unassigned_before_first_reindex() {
    let index = build(params(1, 3));
    assert_eq!(index.partition_count(), 0);
    assert_eq!(index.partition_of(1), None);
    assert_eq!(index.stats().unassigned, 6);

    // Without partitions every entry is scanned.
    assert_eq!(ids(&index, "00000000", 10, &ChunkFilter::any()).len(), 6);
}

#[test]
fn test_reindex_clusters_groups() {
    let mut index = build(params(1, 3));
    let outcome = index.reindex().unwrap();

    assert_eq!(outcome.partitions, 2);
    assert_eq!(outcome.reclaimed, 0);
    assert!(outcome.iterations >= 1);
    let report = outcome.recall.unwrap();
    assert!(report.passed);
    assert_eq!(report.queries, 6);

    let first = index.partition_of(1).unwrap();
    let second = index.partition_of(4).unwrap();
    assert_ne!(first, second);
    for id in 2..=3 {
        assert_eq!(index.partition_of(id), Some(first));
    }
    for id in 5..=6 {
        assert_eq!(index.partition_of(id), Some(second));
    }
    assert_eq!(index.stats().unassigned, 0);
    assert!(!index.is_degraded());
}

#[test]
fn test_search_probes_nearest_partition_only() {
    let mut index = build(params(1, 3));
    index.reindex().unwrap();

    assert_eq!(ids(&index, "00000000", 10, &ChunkFilter::any()), vec![1, 2, 3]);
    assert_eq!(ids(&index, "11111111", 10, &ChunkFilter::any()), vec![4, 5, 6]);
}

#[test]
fn test_all_probes_match_flat_scan() {
    let mut partitioned = build(params(2, 6));
    partitioned.reindex().unwrap();
    let mut flat = FlatIndex::new(8).unwrap();
    for (id, bits) in CORPUS {
        flat.insert(id, code(bits), &ChunkMetadata::new()).unwrap();
    }

    for query in ["00000000", "11110000", "10101010", "11111111"] {
        assert_eq!(
            ids(&partitioned, query, 4, &ChunkFilter::any()),
            ids(&flat, query, 4, &ChunkFilter::any()),
        );
    }
}

#[test]
fn test_clustering_is_deterministic() {
    let mut a = build(params(1, 3));
    let mut b = build(params(1, 3));
    a.reindex().unwrap();
    b.reindex().unwrap();
    assert_eq!(a.partition_state(), b.partition_state());
}

#[test]
fn test_low_recall_degrades_to_flat_scan() {
    // A pool covering the whole corpus cannot be served by one partition.
    let mut index = build(params(1, 6));
    let outcome = index.reindex().unwrap();

    let report = outcome.recall.unwrap();
    assert!(!report.passed);
    assert!(report.mean_recall < 0.9);
    // The probed partition returns only true neighbours, starting with the query itself.
    assert!((report.mean_precision - 1.0).abs() < 1e-12);
    assert!((report.mrr - 1.0).abs() < 1e-12);
    assert!(index.is_degraded());
    assert!(index.stats().degraded);
    assert_eq!(ids(&index, "00000000", 10, &ChunkFilter::any()).len(), 6);
}

#[test]
fn test_insert_after_reindex_joins_nearest_partition() {
    let mut index = build(params(1, 3));
    index.reindex().unwrap();
    let zeros = index.partition_of(1);

    index
        .insert(7, code("00000100"), &ChunkMetadata::new())
        .unwrap();
    assert_eq!(index.partition_of(7), zeros);
    assert_eq!(index.stats().unassigned, 0);
    assert_eq!(ids(&index, "00000000", 2, &ChunkFilter::any()), vec![1, 2]);
    assert!(ids(&index, "00000000", 10, &ChunkFilter::any()).contains(&7));
}

#[test]
fn test_filter_inside_partitions() {
    let mut index = build(params(2, 3));
    index.reindex().unwrap();

    let filter = ChunkFilter::any().with_product_id("B");
    assert_eq!(ids(&index, "00000000", 2, &filter), vec![6, 5]);
}

#[test]
fn test_remove_and_reindex_reclaims() {
    let mut index = build(params(1, 3));
    index.reindex().unwrap();
    index.remove(2).unwrap();
    assert!(!ids(&index, "00000000", 10, &ChunkFilter::any()).contains(&2));

    let outcome = index.reindex().unwrap();
    assert_eq!(outcome.reclaimed, 1);
    assert_eq!(index.len(), 5);
    assert_eq!(index.partition_of(2), None);
    assert!(matches!(index.remove(2), Err(Error::NotFound(2))));
}

#[test]
fn test_restore_partitions_round_trip() {
    let mut index = build(params(1, 3));
    index.reindex().unwrap();
    let state = index.partition_state();

    let mut restored = build(params(1, 3));
    restored.restore_partitions(state.clone()).unwrap();
    assert_eq!(restored.partition_state(), state);
    for (id, _) in CORPUS {
        assert_eq!(restored.partition_of(id), index.partition_of(id));
    }
    assert_eq!(
        ids(&restored, "11111111", 10, &ChunkFilter::any()),
        ids(&index, "11111111", 10, &ChunkFilter::any()),
    );
}

#[test]
fn test_restore_partitions_rejects_bad_state() {
    let mut index = build(params(1, 3));
    index.reindex().unwrap();
    let state = index.partition_state();

    let mut short = state.clone();
    short.assignment.pop();
    assert!(matches!(
        build(params(1, 3)).restore_partitions(short),
        Err(Error::Snapshot(_))
    ));

    let mut out_of_range = state;
    out_of_range.assignment[0] = Some(9);
    assert!(matches!(
        build(params(1, 3)).restore_partitions(out_of_range),
        Err(Error::Snapshot(_))
    ));
}

#[test]
fn test_reindex_empty_index() {
    let mut index = PartitionedIndex::new(8, params(1, 3)).unwrap();
    let outcome = index.reindex().unwrap();
    assert_eq!(outcome.partitions, 0);
    assert!(outcome.recall.is_none());
    assert!(ids(&index, "00000000", 10, &ChunkFilter::any()).is_empty());
}
