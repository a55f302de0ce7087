//! Retrieval quality metrics.
//!
//! Used to validate the partitioned index against the flat baseline:
//! - **Recall@k**: share of the baseline top-k found by the approximate search
//! - **Precision@k**: share of returned results that are in the baseline
//! - **MRR**: reciprocal rank of the first relevant result

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Calculates Recall@k: the proportion of `ground_truth` found in `results`.
///
/// # Formula
///
/// `recall@k = |ground_truth ∩ results| / |ground_truth|`
///
/// An empty ground truth has nothing to miss and yields `1.0`.
#[must_use]
pub fn recall_at_k<T: Eq + Hash + Copy>(ground_truth: &[T], results: &[T]) -> f64 {
    if ground_truth.is_empty() {
        return 1.0;
    }

    let result_set: HashSet<T> = results.iter().copied().collect();
    let found = ground_truth
        .iter()
        .filter(|id| result_set.contains(id))
        .count();

    #[allow(clippy::cast_precision_loss)]
    let recall = found as f64 / ground_truth.len() as f64;
    recall
}

/// Calculates Precision@k: the proportion of `results` present in `ground_truth`.
///
/// Returns `0.0` for empty results.
#[must_use]
pub fn precision_at_k<T: Eq + Hash + Copy>(ground_truth: &[T], results: &[T]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }

    let truth_set: HashSet<T> = ground_truth.iter().copied().collect();
    let relevant = results.iter().filter(|id| truth_set.contains(id)).count();

    #[allow(clippy::cast_precision_loss)]
    let precision = relevant as f64 / results.len() as f64;
    precision
}

/// Calculates Mean Reciprocal Rank for one ranked list.
///
/// Returns `0.0` if no relevant result is found.
#[must_use]
pub fn mrr<T: Eq + Hash + Copy>(ground_truth: &[T], results: &[T]) -> f64 {
    let truth_set: HashSet<T> = ground_truth.iter().copied().collect();

    for (rank, id) in results.iter().enumerate() {
        if truth_set.contains(id) {
            #[allow(clippy::cast_precision_loss)]
            return 1.0 / (rank + 1) as f64;
        }
    }

    0.0
}

/// Quality of one approximate result list against its exact baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySample {
    /// Recall@k of the approximate list.
    pub recall: f64,
    /// Precision@k of the approximate list.
    pub precision: f64,
    /// Reciprocal rank of the exact nearest neighbour in the approximate list.
    pub reciprocal_rank: f64,
}

impl QualitySample {
    /// Scores `results` against the exact `ground_truth` ranking.
    #[must_use]
    pub fn measure<T: Eq + Hash + Copy>(ground_truth: &[T], results: &[T]) -> Self {
        let nearest = &ground_truth[..ground_truth.len().min(1)];
        Self {
            recall: recall_at_k(ground_truth, results),
            precision: precision_at_k(ground_truth, results),
            reciprocal_rank: mrr(nearest, results),
        }
    }
}

/// Outcome of comparing an approximate index against the flat scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallReport {
    /// Number of replayed queries.
    pub queries: usize,
    /// Candidate pool compared per query.
    pub pool: usize,
    /// Mean recall over all queries.
    pub mean_recall: f64,
    /// Worst single-query recall.
    pub worst_recall: f64,
    /// Mean precision over all queries.
    pub mean_precision: f64,
    /// Mean reciprocal rank of each query's exact nearest neighbour.
    pub mrr: f64,
    /// Required mean recall.
    pub threshold: f64,
    /// Whether `mean_recall >= threshold`.
    pub passed: bool,
}

impl RecallReport {
    /// Aggregates per-query samples.
    ///
    /// No samples counts as a perfect score.
    #[must_use]
    pub fn from_samples(samples: &[QualitySample], pool: usize, threshold: f64) -> Self {
        let mut report = Self {
            queries: samples.len(),
            pool,
            mean_recall: 1.0,
            worst_recall: 1.0,
            mean_precision: 1.0,
            mrr: 1.0,
            threshold,
            passed: true,
        };
        if !samples.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let n = samples.len() as f64;
            report.mean_recall = samples.iter().map(|s| s.recall).sum::<f64>() / n;
            report.worst_recall = samples.iter().map(|s| s.recall).fold(f64::INFINITY, f64::min);
            report.mean_precision = samples.iter().map(|s| s.precision).sum::<f64>() / n;
            report.mrr = samples.iter().map(|s| s.reciprocal_rank).sum::<f64>() / n;
            report.passed = report.mean_recall >= threshold;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_at_k() {
        assert!((recall_at_k(&[1, 2, 3, 4], &[1, 2, 9, 8]) - 0.5).abs() < 1e-12);
        assert!((recall_at_k(&[1, 2], &[2, 1]) - 1.0).abs() < 1e-12);
        assert!((recall_at_k::<u64>(&[], &[1]) - 1.0).abs() < 1e-12);
        assert!(recall_at_k(&[1], &[]).abs() < 1e-12);
    }

    #[test]
    fn test_precision_at_k() {
        assert!((precision_at_k(&[1, 2], &[1, 3, 4, 5]) - 0.25).abs() < 1e-12);
        assert!(precision_at_k::<u64>(&[1], &[]).abs() < 1e-12);
    }

    #[test]
    fn test_mrr() {
        assert!((mrr(&[3], &[1, 2, 3]) - 1.0 / 3.0).abs() < 1e-12);
        assert!(mrr(&[7], &[1, 2, 3]).abs() < 1e-12);
    }

    #[test]
    fn test_quality_sample() {
        let sample = QualitySample::measure(&[1, 2, 3, 4], &[2, 1, 9]);
        assert!((sample.recall - 0.5).abs() < 1e-12);
        assert!((sample.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((sample.reciprocal_rank - 0.5).abs() < 1e-12);

        let exact = QualitySample::measure(&[5, 6], &[5, 6]);
        assert_eq!(
            exact,
            QualitySample {
                recall: 1.0,
                precision: 1.0,
                reciprocal_rank: 1.0
            }
        );
    }

    #[test]
    fn test_recall_report() {
        let sample = |recall, precision, reciprocal_rank| QualitySample {
            recall,
            precision,
            reciprocal_rank,
        };
        let report = RecallReport::from_samples(
            &[sample(1.0, 1.0, 1.0), sample(0.5, 0.5, 0.5), sample(0.9, 0.6, 0.0)],
            10,
            0.75,
        );
        assert_eq!(report.queries, 3);
        assert!((report.mean_recall - 0.8).abs() < 1e-12);
        assert!((report.worst_recall - 0.5).abs() < 1e-12);
        assert!((report.mean_precision - 0.7).abs() < 1e-12);
        assert!((report.mrr - 0.5).abs() < 1e-12);
        assert!(report.passed);

        let failed = RecallReport::from_samples(&[sample(0.1, 0.1, 1.0)], 10, 0.8);
        assert!(!failed.passed);

        let empty = RecallReport::from_samples(&[], 10, 0.8);
        assert!(empty.passed);
        assert!((empty.mrr - 1.0).abs() < 1e-12);
    }
}
