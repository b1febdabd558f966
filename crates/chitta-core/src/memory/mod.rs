//! Memory module - core types and data structures
//!
//! The data model: typed nodes with quantized vectors, Beta-like confidence,
//! tags, realms, and weighted typed edges, plus the input/output shapes of
//! the engine API.

mod node;

pub use node::{Confidence, Edge, EdgeType, Node, NodeType, VARIANCE_CAP};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::primitives::NodeId;

// ============================================================================
// RECALL INPUTS
// ============================================================================

/// Search mode for recall queries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Vector search only
    Dense,
    /// BM25 lexical search only
    Sparse,
    /// Dense + sparse with reciprocal-rank fusion (default)
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dense" => Some(SearchMode::Dense),
            "sparse" => Some(SearchMode::Sparse),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

/// Filters applied to recall candidates before ranking
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallFilters {
    /// Every listed tag must be present
    #[serde(default)]
    pub require_tags: Vec<String>,
    /// No listed tag may be present
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Realm scope: this realm plus its ancestors are visible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    /// Minimum effective confidence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f32>,
    /// Minimum epsilon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_epsilon: Option<f32>,
}

/// Options accompanying a `remember` call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RememberOptions {
    /// Initial confidence mean (default 0.5)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reconstructability bias in [0, 1] (default 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
    /// Overrides the type's default decay rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_rate: Option<f32>,
    /// Logical namespace; must already exist in the realm tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

// ============================================================================
// RECALL OUTPUTS
// ============================================================================

/// One recall result, ranked by soul-aware relevance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallHit {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Base similarity: cosine for dense, BM25-normalized for sparse,
    /// normalized RRF for hybrid
    pub similarity: f32,
    /// Soul-aware relevance the ordering is by
    pub relevance: f32,
    pub effective_confidence: f32,
    pub epsilon: f32,
    /// Payload decoded as UTF-8 (lossy)
    pub payload: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub accessed_at: i64,
}

/// One node surfaced by spreading activation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationHit {
    pub id: NodeId,
    pub activation: f32,
}

/// Result of `resonate`: ranked recall plus the activation wave
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResonateResult {
    pub hits: Vec<RecallHit>,
    pub activated: Vec<ActivationHit>,
    /// Number of Similar edges created or strengthened by the Hebbian pass
    pub hebbian_updates: usize,
}

// ============================================================================
// GRAPH OUTPUTS
// ============================================================================

/// A subject/predicate/object triplet with weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triplet {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub weight: f32,
}

/// Result of `connect`: whether an opposing fact already existed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub triplet: Triplet,
    /// True when a supports/contradicts opposite over the same pair is on
    /// record; both facts are kept
    pub conflict: bool,
}

// ============================================================================
// REPORTS
// ============================================================================

/// Report from one dynamics tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Nodes whose confidence decayed this cycle
    pub decayed: u64,
    /// Nodes removed for falling under the prune threshold
    pub pruned: u64,
    /// Feedback events drained from the queue
    pub feedback_applied: u64,
    /// Payloads migrated to the cold tier
    pub migrated_cold: u64,
    /// Vectors nudged by attractor settling
    pub settled: u64,
    /// Snapshot counter, when this tick forced a snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<u64>,
    /// Coherence tau after the cycle
    pub coherence: f32,
    /// Vitality psi after the cycle
    pub vitality: f32,
    pub duration_ms: i64,
}

/// Aggregate statistics about the store
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_nodes: u64,
    pub nodes_by_type: HashMap<String, u64>,
    pub slot_capacity: u64,
    pub wal_bytes: u64,
    pub snapshot_counter: u64,
    pub hot_payloads: u64,
    pub cold_payloads: u64,
    /// Creation time of the oldest memory
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Creation time of the newest memory
    pub newest_memory: Option<DateTime<Utc>>,
    pub coherence: f32,
    pub vitality: f32,
    /// Human-readable vitality band
    pub status: String,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_parse() {
        assert_eq!(SearchMode::parse_name("dense"), Some(SearchMode::Dense));
        assert_eq!(SearchMode::parse_name("Hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(SearchMode::parse_name("fuzzy"), None);
    }

    #[test]
    fn test_recall_filters_deny_unknown_fields() {
        let json = r#"{"requireTags": ["a"], "excludeTags": []}"#;
        assert!(serde_json::from_str::<RecallFilters>(json).is_ok());

        let bad = r#"{"requireTags": [], "surprise": true}"#;
        assert!(serde_json::from_str::<RecallFilters>(bad).is_err());
    }
}
