//! Hybrid fusion and relevance scoring
//!
//! Dense and sparse candidate lists are fused with weighted reciprocal-rank
//! fusion; final ordering always uses soul-aware relevance, a weighted mix
//! of similarity, effective confidence, recency, and epsilon.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// RRF rank constant
pub const RRF_K: f32 = 60.0;
/// Dense share of the fused score
pub const DENSE_WEIGHT: f32 = 0.7;
/// Sparse share of the fused score
pub const SPARSE_WEIGHT: f32 = 0.3;

/// Weighted reciprocal rank fusion.
///
/// `score(d) = w_dense/(k + rank_dense(d)) + w_sparse/(k + rank_sparse(d))`,
/// normalized so the best fused candidate scores 1.0. Rewards candidates
/// surfacing in both lists while staying scale-free across scorers.
pub fn reciprocal_rank_fusion(
    dense: &[(u64, f32)],
    sparse: &[(u64, f32)],
    k: f32,
    dense_weight: f32,
    sparse_weight: f32,
) -> Vec<(u64, f32)> {
    let mut scores: HashMap<u64, f32> = HashMap::new();

    for (rank, &(slot, _)) in dense.iter().enumerate() {
        *scores.entry(slot).or_default() += dense_weight / (k + rank as f32);
    }
    for (rank, &(slot, _)) in sparse.iter().enumerate() {
        *scores.entry(slot).or_default() += sparse_weight / (k + rank as f32);
    }

    let max = scores.values().fold(0.0f32, |m, &s| m.max(s)).max(f32::MIN_POSITIVE);
    let mut results: Vec<(u64, f32)> = scores
        .into_iter()
        .map(|(slot, s)| (slot, s / max))
        .collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

// ============================================================================
// SOUL-AWARE RELEVANCE
// ============================================================================

/// Weights for soul-aware relevance; defaults sum to 1.0
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevanceWeights {
    pub similarity: f32,
    pub confidence: f32,
    pub recency: f32,
    pub epsilon: f32,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            similarity: 0.55,
            confidence: 0.20,
            recency: 0.15,
            epsilon: 0.10,
        }
    }
}

impl RelevanceWeights {
    /// `relevance = s*w_s + confidence*w_c + recency*w_t + epsilon*w_e`
    pub fn score(&self, similarity: f32, confidence: f32, recency: f32, epsilon: f32) -> f32 {
        similarity * self.similarity
            + confidence * self.confidence
            + recency * self.recency
            + epsilon * self.epsilon
    }
}

/// Recency score from days since last access: `exp(-age/30)`
pub fn recency_score(age_days: f32) -> f32 {
    (-age_days.max(0.0) / 30.0).exp()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrf_rewards_overlap() {
        let dense = vec![(1, 0.9), (2, 0.8), (3, 0.7)];
        let sparse = vec![(2, 5.0), (4, 4.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, RRF_K, DENSE_WEIGHT, SPARSE_WEIGHT);

        // slot 2 appears in both lists and should lead
        assert_eq!(fused[0].0, 2);
        assert!((fused[0].1 - 1.0).abs() < 1e-6);
        for w in fused.windows(2) {
            assert!(w[0].1 >= w[1].1);
        }
    }

    #[test]
    fn test_rrf_empty_sparse() {
        let dense = vec![(1, 0.9), (2, 0.5)];
        let fused = reciprocal_rank_fusion(&dense, &[], RRF_K, DENSE_WEIGHT, SPARSE_WEIGHT);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, 1);
    }

    #[test]
    fn test_relevance_weights_default_sum() {
        let w = RelevanceWeights::default();
        let sum = w.similarity + w.confidence + w.recency + w.epsilon;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_ordering() {
        let w = RelevanceWeights::default();
        // identical similarity, higher confidence wins
        let a = w.score(0.8, 0.9, 0.5, 1.0);
        let b = w.score(0.8, 0.2, 0.5, 1.0);
        assert!(a > b);
    }

    #[test]
    fn test_recency_decays() {
        assert!((recency_score(0.0) - 1.0).abs() < 1e-6);
        assert!(recency_score(30.0) < recency_score(7.0));
        assert!(recency_score(365.0) < 0.01);
    }
}
