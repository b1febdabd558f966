//! Search module
//!
//! Fusion and ranking for recall:
//! - weighted reciprocal-rank fusion of dense and sparse candidates
//! - soul-aware relevance (similarity + confidence + recency + epsilon)

mod hybrid;

pub use hybrid::{
    reciprocal_rank_fusion, recency_score, RelevanceWeights, DENSE_WEIGHT, RRF_K, SPARSE_WEIGHT,
};
