//! Attractor settling
//!
//! A small number of iterations that nudge node vectors a capped fraction
//! toward the centroid of their strongest neighbors. Runs only inside the
//! daemon's maintenance cycle; the caller applies each drifted vector
//! through the engine so the change is WAL-logged.

use crate::primitives::QuantizedVector;
use crate::storage::UnifiedIndex;

/// Fraction of the way toward the centroid per iteration
pub const SETTLE_STEP: f32 = 0.05;
/// Cap on per-lane displacement per pass
pub const SETTLE_CAP: f32 = 0.1;
/// Neighbors contributing to the centroid
const NEIGHBOR_LIMIT: usize = 8;

/// One settled vector, computed but not yet applied
#[derive(Debug, Clone)]
pub struct SettledSlot {
    pub slot: u64,
    pub vector: QuantizedVector,
}

/// Run `iterations` settling passes over up to `max_nodes` of the most
/// connected nodes. Returns drifted vectors for the caller to apply.
pub fn settle(
    index: &UnifiedIndex,
    iterations: usize,
    max_nodes: usize,
) -> Vec<SettledSlot> {
    // strongest-edged nodes first
    let mut ranked: Vec<(f32, u64)> = index
        .live_slots()
        .into_iter()
        .filter(|&s| !index.vector(s).is_zero())
        .map(|s| {
            let strength: f32 = index.edges(s).iter().map(|e| e.weight).sum();
            (strength, s)
        })
        .filter(|&(strength, _)| strength > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(max_nodes);

    let mut current: Vec<(u64, Vec<f32>)> = ranked
        .iter()
        .map(|&(_, slot)| (slot, index.vector(slot).dequantize()))
        .collect();

    for _ in 0..iterations {
        let mut next = Vec::with_capacity(current.len());
        for (slot, values) in &current {
            let mut edges = index.edges(*slot);
            edges.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

            let mut centroid = vec![0.0f32; values.len()];
            let mut weight_sum = 0.0f32;
            for edge in edges.iter().take(NEIGHBOR_LIMIT) {
                let Some(nb_slot) = index.slot_of(edge.target) else {
                    continue;
                };
                let nb = index.vector(nb_slot);
                if nb.is_zero() {
                    continue;
                }
                for (c, v) in centroid.iter_mut().zip(nb.dequantize()) {
                    *c += v * edge.weight;
                }
                weight_sum += edge.weight;
            }
            if weight_sum == 0.0 {
                next.push((*slot, values.clone()));
                continue;
            }

            let mut moved = values.clone();
            for (m, c) in moved.iter_mut().zip(centroid.iter()) {
                let delta = (SETTLE_STEP * (c / weight_sum - *m)).clamp(-SETTLE_CAP, SETTLE_CAP);
                *m += delta;
            }
            let norm: f32 = moved.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for m in moved.iter_mut() {
                    *m /= norm;
                }
            }
            next.push((*slot, moved));
        }
        current = next;
    }

    current
        .into_iter()
        .map(|(slot, values)| SettledSlot {
            slot,
            vector: QuantizedVector::quantize(&values),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Confidence, Edge, EdgeType, Node, NodeType};
    use crate::primitives::NodeId;
    use tempfile::TempDir;

    fn unit(raw: Vec<f32>) -> Vec<f32> {
        let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        raw.into_iter().map(|v| v / norm).collect()
    }

    #[test]
    fn test_settling_drifts_toward_neighbors() {
        let dir = TempDir::new().unwrap();
        let mut index = UnifiedIndex::create(&dir.path().join("s.unified"), 4).unwrap();

        let anchor = Node {
            id: NodeId::generate(),
            node_type: NodeType::Wisdom,
            vector: QuantizedVector::quantize(&unit(vec![1.0, 0.0, 0.0, 0.0])),
            confidence: Confidence::new(0.9, 0),
            decay_rate: 0.0,
            epsilon: 1.0,
            created_at: 0,
            accessed_at: 0,
            payload: Vec::new(),
            tags: vec![],
            edges: vec![],
            realm: None,
        };
        let drifter = Node {
            id: NodeId::generate(),
            vector: QuantizedVector::quantize(&unit(vec![0.0, 1.0, 0.0, 0.0])),
            edges: vec![Edge {
                target: anchor.id,
                edge_type: EdgeType::Similar,
                weight: 1.0,
            }],
            ..anchor.clone()
        };
        index.insert(&anchor, 0, 0, 0).unwrap();
        let drifter_slot = index.insert(&drifter, 0, 0, 0).unwrap();

        let before = index
            .vector(drifter_slot)
            .approx_cosine(&index.vector(index.slot_of(anchor.id).unwrap()));

        let settled = settle(&index, 3, 16);
        let moved = settled.iter().find(|s| s.slot == drifter_slot).unwrap();
        let after = moved
            .vector
            .approx_cosine(&index.vector(index.slot_of(anchor.id).unwrap()));

        assert!(after > before, "settling should pull the drifter closer");
        assert!((moved.vector.real_norm() - 1.0).abs() < 0.02);
    }

    #[test]
    fn test_edgeless_nodes_do_not_move() {
        let dir = TempDir::new().unwrap();
        let mut index = UnifiedIndex::create(&dir.path().join("s.unified"), 4).unwrap();
        let lone = Node {
            id: NodeId::generate(),
            node_type: NodeType::Wisdom,
            vector: QuantizedVector::quantize(&unit(vec![1.0, 1.0, 0.0, 0.0])),
            confidence: Confidence::new(0.9, 0),
            decay_rate: 0.0,
            epsilon: 1.0,
            created_at: 0,
            accessed_at: 0,
            payload: Vec::new(),
            tags: vec![],
            edges: vec![],
            realm: None,
        };
        index.insert(&lone, 0, 0, 0).unwrap();
        assert!(settle(&index, 3, 16).is_empty());
    }
}
