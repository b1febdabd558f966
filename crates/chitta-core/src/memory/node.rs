//! Memory node - the persistent unit of memory
//!
//! Each node carries:
//! - A quantized embedding vector (unit norm, or the pending-embedding sentinel)
//! - A Beta-like confidence estimator
//! - Decay rate, epsilon, timestamps
//! - Payload bytes, tags, and typed outbound edges

use serde::{Deserialize, Serialize};

use crate::primitives::{NodeId, QuantizedVector};

// ============================================================================
// NODE TYPES
// ============================================================================

/// Types of memory nodes.
///
/// The type drives the default decay rate and the pruning policy:
/// invariants and beliefs never decay and are never auto-pruned.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Distilled practical knowledge
    #[default]
    Wisdom,
    /// A held conviction; protected from decay and pruning
    Belief,
    /// A recorded mistake worth not repeating
    Failure,
    /// A concrete experience bound to a moment
    Episode,
    /// A goal or desired future state
    Aspiration,
    /// Speculative, loosely-grounded material
    Dream,
    /// A named concept or definition
    Term,
    /// An open question
    Question,
    /// A rule that must always hold; protected from decay and pruning
    Invariant,
    /// A known hole in the memory
    Gap,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Wisdom => "wisdom",
            NodeType::Belief => "belief",
            NodeType::Failure => "failure",
            NodeType::Episode => "episode",
            NodeType::Aspiration => "aspiration",
            NodeType::Dream => "dream",
            NodeType::Term => "term",
            NodeType::Question => "question",
            NodeType::Invariant => "invariant",
            NodeType::Gap => "gap",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wisdom" => Some(NodeType::Wisdom),
            "belief" => Some(NodeType::Belief),
            "failure" => Some(NodeType::Failure),
            "episode" => Some(NodeType::Episode),
            "aspiration" => Some(NodeType::Aspiration),
            "dream" => Some(NodeType::Dream),
            "term" => Some(NodeType::Term),
            "question" => Some(NodeType::Question),
            "invariant" => Some(NodeType::Invariant),
            "gap" => Some(NodeType::Gap),
            _ => None,
        }
    }

    /// Protected types are exempt from decay and from every automatic
    /// removal path; explicit `forget` refuses them too.
    pub fn is_protected(&self) -> bool {
        matches!(self, NodeType::Invariant | NodeType::Belief)
    }

    /// Default decay rate per day; 0 for protected types
    pub fn default_decay_rate(&self) -> f32 {
        match self {
            NodeType::Invariant | NodeType::Belief => 0.0,
            NodeType::Term => 0.005,
            NodeType::Wisdom => 0.01,
            NodeType::Failure | NodeType::Aspiration => 0.02,
            NodeType::Question => 0.03,
            NodeType::Gap => 0.04,
            NodeType::Episode => 0.05,
            NodeType::Dream => 0.08,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            NodeType::Wisdom => 0,
            NodeType::Belief => 1,
            NodeType::Failure => 2,
            NodeType::Episode => 3,
            NodeType::Aspiration => 4,
            NodeType::Dream => 5,
            NodeType::Term => 6,
            NodeType::Question => 7,
            NodeType::Invariant => 8,
            NodeType::Gap => 9,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(NodeType::Wisdom),
            1 => Some(NodeType::Belief),
            2 => Some(NodeType::Failure),
            3 => Some(NodeType::Episode),
            4 => Some(NodeType::Aspiration),
            5 => Some(NodeType::Dream),
            6 => Some(NodeType::Term),
            7 => Some(NodeType::Question),
            8 => Some(NodeType::Invariant),
            9 => Some(NodeType::Gap),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EDGES
// ============================================================================

/// Type of a directed edge between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Semantically similar; the type Hebbian updates create
    Similar,
    /// Source supports the target
    Supports,
    /// Source contradicts the target; recorded as a fact, not a retraction
    Contradicts,
    /// Source was applied in the target's context
    AppliedIn,
    /// Source evolved from the target
    EvolvedFrom,
    /// Source is part of the target
    PartOf,
    /// Source was triggered by the target
    TriggeredBy,
    /// Generic association
    RelatesTo,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Similar => "similar",
            EdgeType::Supports => "supports",
            EdgeType::Contradicts => "contradicts",
            EdgeType::AppliedIn => "applied_in",
            EdgeType::EvolvedFrom => "evolved_from",
            EdgeType::PartOf => "part_of",
            EdgeType::TriggeredBy => "triggered_by",
            EdgeType::RelatesTo => "relates_to",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "similar" => Some(EdgeType::Similar),
            "supports" => Some(EdgeType::Supports),
            "contradicts" => Some(EdgeType::Contradicts),
            "applied_in" | "appliedin" => Some(EdgeType::AppliedIn),
            "evolved_from" | "evolvedfrom" => Some(EdgeType::EvolvedFrom),
            "part_of" | "partof" => Some(EdgeType::PartOf),
            "triggered_by" | "triggeredby" => Some(EdgeType::TriggeredBy),
            "relates_to" | "relatesto" => Some(EdgeType::RelatesTo),
            _ => None,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            EdgeType::Similar => 0,
            EdgeType::Supports => 1,
            EdgeType::Contradicts => 2,
            EdgeType::AppliedIn => 3,
            EdgeType::EvolvedFrom => 4,
            EdgeType::PartOf => 5,
            EdgeType::TriggeredBy => 6,
            EdgeType::RelatesTo => 7,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EdgeType::Similar),
            1 => Some(EdgeType::Supports),
            2 => Some(EdgeType::Contradicts),
            3 => Some(EdgeType::AppliedIn),
            4 => Some(EdgeType::EvolvedFrom),
            5 => Some(EdgeType::PartOf),
            6 => Some(EdgeType::TriggeredBy),
            7 => Some(EdgeType::RelatesTo),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed, weighted, typed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub target: NodeId,
    pub edge_type: EdgeType,
    /// Weight in [0, 1]
    pub weight: f32,
}

// ============================================================================
// CONFIDENCE
// ============================================================================

/// Beta-like confidence estimator.
///
/// Tracks a running mean and variance over observations in [0, 1]. The
/// effective confidence discounts the mean by its spread:
/// `mu * max(1 - 2 * sqrt(variance), 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    /// Mean estimate in [0, 1]
    pub mu: f32,
    /// Variance, capped at 0.25
    pub variance: f32,
    /// Observation count, monotonically non-decreasing
    pub observations: u32,
    /// Last update time, seconds since the Unix epoch
    pub updated_at: u32,
}

/// Variance cap; a Bernoulli variable cannot exceed it
pub const VARIANCE_CAP: f32 = 0.25;

impl Confidence {
    pub fn new(mu: f32, now_ms: i64) -> Self {
        Self {
            mu: mu.clamp(0.0, 1.0),
            variance: 0.05,
            observations: 1,
            updated_at: (now_ms / 1000) as u32,
        }
    }

    /// Effective confidence: the mean discounted by its spread
    pub fn effective(&self) -> f32 {
        (self.mu * (1.0 - 2.0 * self.variance.sqrt()).max(0.0)).clamp(0.0, 1.0)
    }

    /// Fold in one observation in [0, 1] (Welford running moments)
    pub fn observe(&mut self, value: f32, now_ms: i64) {
        let value = value.clamp(0.0, 1.0);
        self.observations = self.observations.saturating_add(1);
        let n = self.observations as f32;
        let delta = value - self.mu;
        self.mu = (self.mu + delta / n).clamp(0.0, 1.0);
        let delta2 = value - self.mu;
        // blend the sample spread into the running variance
        self.variance = (((n - 1.0) * self.variance + delta * delta2) / n)
            .clamp(0.0, VARIANCE_CAP);
        self.updated_at = (now_ms / 1000) as u32;
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self {
            mu: 0.5,
            variance: 0.05,
            observations: 1,
            updated_at: 0,
        }
    }
}

// ============================================================================
// NODE
// ============================================================================

/// A memory node: the canonical persistent entity
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Immutable identifier
    pub id: NodeId,
    pub node_type: NodeType,
    /// Quantized unit vector, or the zero sentinel while embedding is pending
    pub vector: QuantizedVector,
    pub confidence: Confidence,
    /// Non-negative decay rate per day; 0 for protected types
    pub decay_rate: f32,
    /// Reconstructability bias in [0, 1]; author-supplied
    pub epsilon: f32,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; touched on every read
    pub accessed_at: i64,
    /// Opaque payload bytes (UTF-8 text by convention)
    pub payload: Vec<u8>,
    /// Tag set; keys unique, order irrelevant
    pub tags: Vec<String>,
    /// Outbound edges
    pub edges: Vec<Edge>,
    /// Logical namespace; `None` means the root realm
    pub realm: Option<String>,
}

impl Node {
    /// Payload decoded as UTF-8 (lossy)
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn effective_confidence(&self) -> f32 {
        self.confidence.effective()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_roundtrip() {
        for nt in [
            NodeType::Wisdom,
            NodeType::Belief,
            NodeType::Failure,
            NodeType::Episode,
            NodeType::Aspiration,
            NodeType::Dream,
            NodeType::Term,
            NodeType::Question,
            NodeType::Invariant,
            NodeType::Gap,
        ] {
            assert_eq!(NodeType::parse_name(nt.as_str()), Some(nt));
            assert_eq!(NodeType::from_u8(nt.to_u8()), Some(nt));
        }
        assert_eq!(NodeType::parse_name("nonsense"), None);
    }

    #[test]
    fn test_protected_types() {
        assert!(NodeType::Invariant.is_protected());
        assert!(NodeType::Belief.is_protected());
        assert!(!NodeType::Wisdom.is_protected());
        assert_eq!(NodeType::Invariant.default_decay_rate(), 0.0);
        assert_eq!(NodeType::Belief.default_decay_rate(), 0.0);
        assert!(NodeType::Episode.default_decay_rate() > 0.0);
    }

    #[test]
    fn test_edge_type_roundtrip() {
        for et in [
            EdgeType::Similar,
            EdgeType::Supports,
            EdgeType::Contradicts,
            EdgeType::AppliedIn,
            EdgeType::EvolvedFrom,
            EdgeType::PartOf,
            EdgeType::TriggeredBy,
            EdgeType::RelatesTo,
        ] {
            assert_eq!(EdgeType::parse_name(et.as_str()), Some(et));
            assert_eq!(EdgeType::from_u8(et.to_u8()), Some(et));
        }
    }

    #[test]
    fn test_confidence_effective_discounts_spread() {
        let tight = Confidence { mu: 0.9, variance: 0.0, observations: 5, updated_at: 0 };
        let loose = Confidence { mu: 0.9, variance: 0.2, observations: 5, updated_at: 0 };
        assert!(tight.effective() > loose.effective());
        assert!((tight.effective() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_observe_moves_mean() {
        let mut c = Confidence::new(0.5, 0);
        for _ in 0..20 {
            c.observe(1.0, 1_000);
        }
        assert!(c.mu > 0.9);
        assert_eq!(c.observations, 21);
        assert!(c.variance <= VARIANCE_CAP);
    }

    #[test]
    fn test_confidence_observations_monotone() {
        let mut c = Confidence::new(0.7, 0);
        let mut last = c.observations;
        for i in 0..10 {
            c.observe(if i % 2 == 0 { 0.2 } else { 0.9 }, 0);
            assert!(c.observations > last);
            last = c.observations;
        }
    }
}
