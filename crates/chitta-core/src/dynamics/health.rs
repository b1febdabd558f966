//! Coherence and vitality
//!
//! Two aggregate health metrics in [0, 1]:
//! - coherence tau: weighted mix of local (contradiction share), global
//!   (confidence quality), and temporal (access freshness) signals
//! - vitality psi: structural, semantic, temporal, and capacity components,
//!   mapped to a human-readable status band

use crate::memory::EdgeType;
use crate::storage::{UnifiedIndex, ANN_M0};
use crate::time::MS_PER_DAY;

/// Rolling window for "recent" access
pub const RECENT_WINDOW_DAYS: f32 = 7.0;
/// Accesses older than this are "stale"
pub const STALE_WINDOW_DAYS: f32 = 30.0;

/// Coherence tau: `0.5*local + 0.3*global + 0.2*temporal`
pub fn coherence(index: &UnifiedIndex, now_ms: i64) -> f32 {
    let slots = index.live_slots();
    if slots.is_empty() {
        return 1.0;
    }

    let mut total_edges = 0u64;
    let mut contradict_edges = 0u64;
    let mut conf_sum = 0.0f64;
    let mut var_sum = 0.0f64;
    let mut recent = 0u64;
    let mut stale = 0u64;

    for &slot in &slots {
        let meta = index.meta(slot);
        for edge in index.edges(slot) {
            total_edges += 1;
            if edge.edge_type == EdgeType::Contradicts {
                contradict_edges += 1;
            }
        }
        conf_sum += meta.confidence.effective() as f64;
        var_sum += meta.confidence.variance as f64;
        let age_days = ((now_ms - meta.accessed_at).max(0) as f32) / MS_PER_DAY as f32;
        if age_days <= RECENT_WINDOW_DAYS {
            recent += 1;
        } else if age_days > STALE_WINDOW_DAYS {
            stale += 1;
        }
    }

    let n = slots.len() as f32;
    let local = 1.0 - contradict_edges as f32 / total_edges.max(1) as f32;
    let mean_conf = (conf_sum / n as f64) as f32;
    let mean_var = (var_sum / n as f64) as f32;
    let global = mean_conf * (1.0 - mean_var.sqrt());
    let temporal = 0.5 + 0.3 * (recent as f32 / n) - 0.2 * (stale as f32 / n);

    (0.5 * local + 0.3 * global + 0.2 * temporal).clamp(0.0, 1.0)
}

/// Vitality psi: mean of structural, semantic, temporal, and capacity
/// components
pub fn vitality(index: &UnifiedIndex, now_ms: i64, hot_len: usize, hot_capacity: usize) -> f32 {
    let slots = index.live_slots();
    if slots.is_empty() {
        return 1.0;
    }
    let n = slots.len() as f32;

    // structural: connectivity saturation against the level-0 bound
    let edge_total: usize = slots.iter().map(|&s| index.edges(s).len()).sum();
    let structural = (edge_total as f32 / (n * ANN_M0 as f32 / 4.0)).min(1.0);

    // semantic: average pairwise similarity among the most recently
    // activated nodes, mapped onto [0, 1]
    let mut recent_slots: Vec<(i64, u64)> = slots
        .iter()
        .map(|&s| (index.meta(s).accessed_at, s))
        .collect();
    recent_slots.sort_by(|a, b| b.0.cmp(&a.0));
    let top: Vec<u64> = recent_slots
        .iter()
        .map(|&(_, s)| s)
        .filter(|&s| !index.vector(s).is_zero())
        .take(16)
        .collect();
    let semantic = if top.len() < 2 {
        0.5
    } else {
        let mut sum = 0.0f32;
        let mut pairs = 0u32;
        for i in 0..top.len() {
            let vi = index.vector(top[i]);
            for &tj in top.iter().skip(i + 1) {
                sum += vi.approx_cosine(&index.vector(tj));
                pairs += 1;
            }
        }
        ((sum / pairs as f32) + 1.0) / 2.0
    };

    // temporal: activity density inside the recent window
    let recent = slots
        .iter()
        .filter(|&&s| {
            ((now_ms - index.meta(s).accessed_at).max(0) as f32) / MS_PER_DAY as f32
                <= RECENT_WINDOW_DAYS
        })
        .count() as f32;
    let temporal = recent / n;

    // capacity: headroom in the index and the hot tier
    let index_headroom = 1.0 - (index.len() as f32 / index.slot_capacity().max(1) as f32);
    let hot_headroom = 1.0 - (hot_len as f32 / hot_capacity.max(1) as f32);
    let capacity = index_headroom.min(hot_headroom).clamp(0.0, 1.0);

    ((structural + semantic + temporal + capacity) / 4.0).clamp(0.0, 1.0)
}

/// Human-readable vitality band
pub fn vitality_status(psi: f32) -> &'static str {
    if psi >= 0.75 {
        "thriving"
    } else if psi >= 0.5 {
        "healthy"
    } else if psi >= 0.3 {
        "strained"
    } else {
        "depleted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Confidence, Edge, Node, NodeType};
    use crate::primitives::{NodeId, QuantizedVector};
    use tempfile::TempDir;

    fn node(now: i64, edges: Vec<Edge>) -> Node {
        let raw: Vec<f32> = (0..16).map(|j| (j as f32 * 0.2).sin()).collect();
        Node {
            id: NodeId::generate(),
            node_type: NodeType::Wisdom,
            vector: QuantizedVector::quantize(&raw),
            confidence: Confidence::new(0.9, now),
            decay_rate: 0.01,
            epsilon: 1.0,
            created_at: now,
            accessed_at: now,
            payload: Vec::new(),
            tags: vec![],
            edges,
            realm: None,
        }
    }

    #[test]
    fn test_empty_store_is_fully_coherent() {
        let dir = TempDir::new().unwrap();
        let index = UnifiedIndex::create(&dir.path().join("c.unified"), 16).unwrap();
        assert_eq!(coherence(&index, 0), 1.0);
        assert_eq!(vitality(&index, 0, 0, 64), 1.0);
    }

    #[test]
    fn test_contradictions_lower_coherence() {
        let dir = TempDir::new().unwrap();
        let now = 1_000_000;

        let mut clean = UnifiedIndex::create(&dir.path().join("clean.unified"), 16).unwrap();
        let a = node(now, vec![]);
        let mut b = node(now, vec![]);
        b.edges = vec![Edge { target: a.id, edge_type: EdgeType::Supports, weight: 1.0 }];
        clean.insert(&a, 0, 0, 0).unwrap();
        clean.insert(&b, 0, 0, 0).unwrap();

        let mut torn = UnifiedIndex::create(&dir.path().join("torn.unified"), 16).unwrap();
        let c = node(now, vec![]);
        let mut d = node(now, vec![]);
        d.edges = vec![Edge { target: c.id, edge_type: EdgeType::Contradicts, weight: 1.0 }];
        torn.insert(&c, 0, 0, 0).unwrap();
        torn.insert(&d, 0, 0, 0).unwrap();

        assert!(coherence(&clean, now) > coherence(&torn, now));
    }

    #[test]
    fn test_stale_store_scores_lower_vitality() {
        let dir = TempDir::new().unwrap();
        let now = 100 * MS_PER_DAY;

        let mut fresh = UnifiedIndex::create(&dir.path().join("fresh.unified"), 16).unwrap();
        let mut old = UnifiedIndex::create(&dir.path().join("old.unified"), 16).unwrap();
        for i in 0..4 {
            let mut f = node(now - i, vec![]);
            f.accessed_at = now;
            fresh.insert(&f, 0, 0, 0).unwrap();

            let mut o = node(now - i, vec![]);
            o.accessed_at = now - 90 * MS_PER_DAY;
            old.insert(&o, 0, 0, 0).unwrap();
        }

        assert!(vitality(&fresh, now, 0, 64) > vitality(&old, now, 0, 64));
    }

    #[test]
    fn test_status_bands() {
        assert_eq!(vitality_status(0.9), "thriving");
        assert_eq!(vitality_status(0.6), "healthy");
        assert_eq!(vitality_status(0.35), "strained");
        assert_eq!(vitality_status(0.1), "depleted");
    }
}
