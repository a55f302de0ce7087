//! Tests for the float store and reranker.

use super::float_store::FloatStore;
use crate::error::Error;

fn store() -> FloatStore {
    let mut store = FloatStore::new(2);
    store.put(1, vec![1.0, 1.0]).unwrap();
    store.put(2, vec![1.0, -1.0]).unwrap();
    store.put(3, vec![-1.0, -1.0]).unwrap();
    store
}

#[test]
fn test_put_get_delete() {
    let mut store = store();
    assert_eq!(store.len(), 3);
    assert_eq!(store.get(2).unwrap(), &[1.0, -1.0]);

    assert_eq!(store.delete(2).unwrap(), vec![1.0, -1.0]);
    assert!(matches!(store.get(2), Err(Error::NotFound(2))));
    assert!(matches!(store.delete(2), Err(Error::NotFound(2))));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_put_rejects_wrong_dimension() {
    let mut store = FloatStore::new(3);
    assert!(matches!(
        store.put(1, vec![1.0]),
        Err(Error::DimensionMismatch {
            expected: 3,
            actual: 1
        })
    ));
    assert!(store.is_empty());
}

#[test]
fn test_rerank_orders_by_cosine() {
    let store = store();
    let ranked = store.rerank(&[0.9, 0.8], &[3, 2, 1], 3).unwrap();
    let ids: Vec<u64> = ranked.iter().map(|s| s.chunk_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_rerank_length_is_min_of_k_and_candidates() {
    let store = store();
    assert_eq!(store.rerank(&[1.0, 0.0], &[1, 2, 3], 2).unwrap().len(), 2);
    assert_eq!(store.rerank(&[1.0, 0.0], &[1, 2], 10).unwrap().len(), 2);
    assert!(store.rerank(&[1.0, 0.0], &[1, 2], 0).unwrap().is_empty());
    assert!(store.rerank(&[1.0, 0.0], &[], 5).unwrap().is_empty());
}

#[test]
fn test_rerank_self_similarity_is_one() {
    let mut store = FloatStore::new(4);
    store.put(9, vec![0.5, 0.5, 0.5, 0.5]).unwrap();
    let ranked = store.rerank(&[0.5, 0.5, 0.5, 0.5], &[9], 1).unwrap();
    assert!((ranked[0].score - 1.0).abs() <= 1e-6);
}

#[test]
fn test_rerank_zero_norm_scores_zero() {
    let mut store = FloatStore::new(2);
    store.put(1, vec![0.0, 0.0]).unwrap();
    store.put(2, vec![1.0, 0.0]).unwrap();

    let ranked = store.rerank(&[1.0, 0.0], &[1, 2], 2).unwrap();
    assert_eq!(ranked[0].chunk_id, 2);
    assert_eq!(ranked[1].chunk_id, 1);
    assert_eq!(ranked[1].score, 0.0);

    let zero_query = store.rerank(&[0.0, 0.0], &[2, 1], 2).unwrap();
    assert!(zero_query.iter().all(|s| s.score == 0.0 && !s.score.is_nan()));
}

#[test]
fn test_rerank_ties_keep_input_order() {
    let mut store = FloatStore::new(2);
    store.put(10, vec![1.0, 0.0]).unwrap();
    store.put(11, vec![2.0, 0.0]).unwrap();
    store.put(12, vec![3.0, 0.0]).unwrap();

    let ranked = store.rerank(&[1.0, 0.0], &[12, 10, 11], 3).unwrap();
    let ids: Vec<u64> = ranked.iter().map(|s| s.chunk_id).collect();
    assert_eq!(ids, vec![12, 10, 11]);

    let ranked = store.rerank(&[1.0, 0.0], &[11, 12, 10], 2).unwrap();
    let ids: Vec<u64> = ranked.iter().map(|s| s.chunk_id).collect();
    assert_eq!(ids, vec![11, 12]);
}

#[test]
fn test_rerank_drops_missing_and_repeated_candidates() {
    let store = store();
    let ranked = store.rerank(&[1.0, 1.0], &[42, 1, 1, 2], 5).unwrap();
    let ids: Vec<u64> = ranked.iter().map(|s| s.chunk_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_rerank_rejects_wrong_query_dimension() {
    let store = store();
    assert!(matches!(
        store.rerank(&[1.0, 1.0, 1.0], &[1], 1),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_rerank_large_magnitude_embeddings() {
    let mut store = FloatStore::new(2);
    store.put(1, vec![3e19, 3e19]).unwrap();
    store.put(2, vec![3e19, -3e19]).unwrap();

    let ranked = store.rerank(&[3e19, 3e19], &[2, 1], 2).unwrap();
    assert_eq!(ranked[0].chunk_id, 1);
    assert!((ranked[0].score - 1.0).abs() <= 1e-6, "got {}", ranked[0].score);
    assert!(ranked[1].score.abs() <= 1e-6);
}
