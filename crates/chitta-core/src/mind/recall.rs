//! Recall pipeline
//!
//! Candidate generation (ANN + BM25), fusion, filtering, and soul-aware
//! ranking, plus `resonate` (recall + spreading activation + Hebbian
//! strengthening of the activated set).

use tracing::debug;

use super::{Mind, HEBBIAN_ACTIVATION_MIN};
use crate::error::{ChittaError, Result};
use crate::memory::{RecallFilters, RecallHit, ResonateResult, SearchMode};
use crate::primitives::{NodeId, QuantizedVector};
use crate::search::{
    recency_score, reciprocal_rank_fusion, DENSE_WEIGHT, RRF_K, SPARSE_WEIGHT,
};
use crate::storage::{NodeMeta, EF_SEARCH};
use crate::time::MS_PER_DAY;

/// Recall input: raw text, or a pre-embedded unit vector
#[derive(Debug, Clone)]
pub enum RecallQuery {
    Text(String),
    Vector(Vec<f32>),
}

impl Mind {
    /// Recall at most `k` memories, ranked by soul-aware relevance.
    ///
    /// Text queries in dense or hybrid mode need an embedder; sparse mode
    /// works without one. Results are deduplicated by id and every returned
    /// node is touched.
    pub fn recall(
        &mut self,
        query: RecallQuery,
        k: usize,
        threshold: Option<f32>,
        mode: SearchMode,
        filters: &RecallFilters,
    ) -> Result<Vec<RecallHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let scope = match &filters.realm {
            Some(name) => Some(self.realm_scope(name)?),
            None => None,
        };

        let (text, vector) = match query {
            RecallQuery::Text(text) => {
                if text.trim().is_empty() {
                    return Err(ChittaError::InvalidParams("query must be non-empty".into()));
                }
                let vector = match mode {
                    SearchMode::Sparse => None,
                    SearchMode::Dense | SearchMode::Hybrid => Some(self.query_vector(&text)?),
                };
                (Some(text), vector)
            }
            RecallQuery::Vector(vector) => {
                if mode == SearchMode::Sparse {
                    return Err(ChittaError::InvalidParams(
                        "sparse recall needs a text query".into(),
                    ));
                }
                (None, Some(vector))
            }
        };

        let candidate_k = (k * 4).max(16);
        let dense: Vec<(u64, f32)> = match &vector {
            Some(v) => {
                let quantized = QuantizedVector::quantize(v);
                self.index().search(&quantized, candidate_k, EF_SEARCH)
            }
            None => Vec::new(),
        };
        let sparse: Vec<(u64, f32)> = match (&text, mode) {
            (Some(t), SearchMode::Sparse | SearchMode::Hybrid) => {
                self.sparse_index().search(t, candidate_k)
            }
            _ => Vec::new(),
        };

        // base similarity per mode
        let scored: Vec<(u64, f32)> = match mode {
            SearchMode::Dense => dense,
            SearchMode::Sparse => {
                let max = sparse
                    .iter()
                    .map(|&(_, s)| s)
                    .fold(f32::MIN_POSITIVE, f32::max);
                sparse.into_iter().map(|(slot, s)| (slot, s / max)).collect()
            }
            SearchMode::Hybrid => {
                reciprocal_rank_fusion(&dense, &sparse, RRF_K, DENSE_WEIGHT, SPARSE_WEIGHT)
            }
        };

        let now = self.now_ms();
        let weights = self.relevance_weights();
        let min_similarity = threshold.unwrap_or(f32::MIN);
        let mut ranked: Vec<(u64, f32, f32, NodeMeta)> = Vec::new();
        for (slot, similarity) in scored {
            if similarity < min_similarity {
                continue;
            }
            let meta = self.index().meta(slot);
            if !self.passes_filters(slot, &meta, filters, scope) {
                continue;
            }
            let age_days = ((now - meta.accessed_at).max(0) as f32) / MS_PER_DAY as f32;
            let relevance = weights.score(
                similarity,
                meta.confidence.effective(),
                recency_score(age_days),
                meta.epsilon,
            );
            ranked.push((slot, similarity, relevance, meta));
        }
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        let mut hits = Vec::with_capacity(ranked.len());
        for (slot, similarity, relevance, meta) in ranked {
            self.touch_slot(slot)?;
            let node = self.assemble_node(slot)?;
            hits.push(RecallHit {
                id: node.id,
                node_type: meta.node_type,
                similarity,
                relevance,
                effective_confidence: meta.confidence.effective(),
                epsilon: meta.epsilon,
                payload: node.payload_text(),
                tags: node.tags,
                created_at: meta.created_at,
                accessed_at: meta.accessed_at,
            });
        }
        debug!(hits = hits.len(), "recall complete");
        Ok(hits)
    }

    /// Recall, spread activation from the hits, and Hebbian-strengthen the
    /// activated set.
    pub fn resonate(
        &mut self,
        text: &str,
        k: usize,
        spread_depth: usize,
        hebbian_strength: f32,
        exclude_tags: Vec<String>,
    ) -> Result<ResonateResult> {
        let filters = RecallFilters {
            exclude_tags,
            ..RecallFilters::default()
        };
        let hits = self.recall(
            RecallQuery::Text(text.to_string()),
            k,
            None,
            SearchMode::Hybrid,
            &filters,
        )?;

        let seeds: Vec<(NodeId, f32)> =
            hits.iter().map(|h| (h.id, h.similarity)).collect();
        let activated = self.spread_activation(&seeds, spread_depth);

        let hebbian_updates = if hebbian_strength > 0.0 {
            let co_activated: Vec<NodeId> = activated
                .iter()
                .filter(|h| h.activation >= HEBBIAN_ACTIVATION_MIN)
                .map(|h| h.id)
                .collect();
            self.hebbian_pass(&co_activated, hebbian_strength)?
        } else {
            0
        };

        Ok(ResonateResult {
            hits,
            activated,
            hebbian_updates,
        })
    }

    fn passes_filters(
        &self,
        slot: u64,
        meta: &NodeMeta,
        filters: &RecallFilters,
        scope: Option<u16>,
    ) -> bool {
        if let Some(min) = filters.min_confidence {
            if meta.confidence.effective() < min {
                return false;
            }
        }
        if let Some(min) = filters.min_epsilon {
            if meta.epsilon < min {
                return false;
            }
        }
        if let Some(scope) = scope {
            if !self.realm_visible(meta.realm, scope) {
                return false;
            }
        }
        if !filters.require_tags.is_empty() || !filters.exclude_tags.is_empty() {
            let tags = self.tags_index().tags_for_slot(slot);
            if !filters.require_tags.iter().all(|t| tags.contains(t)) {
                return false;
            }
            if filters.exclude_tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        true
    }
}
