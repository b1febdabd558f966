//! Hebbian updates
//!
//! Co-activated nodes wire together: for every pair in the activated set, a
//! `Similar` edge is created at the update strength or strengthened by it,
//! saturating at 1.0. Updates are bidirectional.

use crate::error::Result;
use crate::memory::{Edge, EdgeType};
use crate::storage::UnifiedIndex;

/// Largest accepted update strength
pub const MAX_STRENGTH: f32 = 0.5;

/// Apply a Hebbian pass over a co-activated slot set. Returns the edges as
/// written, for WAL logging by the caller.
pub fn hebbian_update(
    index: &mut UnifiedIndex,
    activated: &[u64],
    strength: f32,
) -> Result<Vec<(u64, Edge)>> {
    let strength = strength.clamp(f32::MIN_POSITIVE, MAX_STRENGTH);
    let mut written = Vec::new();

    for &a in activated {
        for &b in activated {
            if a == b {
                continue;
            }
            let target = index.id_at(b);
            if target.is_zero() {
                continue;
            }
            let weight = index
                .edges(a)
                .iter()
                .find(|e| e.target == target && e.edge_type == EdgeType::Similar)
                .map(|e| (e.weight + strength).min(1.0))
                .unwrap_or(strength);
            let edge = Edge {
                target,
                edge_type: EdgeType::Similar,
                weight,
            };
            index.upsert_edge(a, &edge)?;
            written.push((a, edge));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Confidence, Node, NodeType};
    use crate::primitives::{NodeId, QuantizedVector};
    use tempfile::TempDir;

    fn test_index(n: usize) -> (UnifiedIndex, Vec<u64>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut index = UnifiedIndex::create(&dir.path().join("h.unified"), 16).unwrap();
        let mut slots = Vec::new();
        for i in 0..n {
            let raw: Vec<f32> = (0..16).map(|j| ((i * 17 + j) as f32 * 0.3).sin()).collect();
            let node = Node {
                id: NodeId::generate(),
                node_type: NodeType::Wisdom,
                vector: QuantizedVector::quantize(&raw),
                confidence: Confidence::new(0.8, 0),
                decay_rate: 0.01,
                epsilon: 1.0,
                created_at: 0,
                accessed_at: 0,
                payload: Vec::new(),
                tags: vec![],
                edges: vec![],
                realm: None,
            };
            slots.push(index.insert(&node, 0, 0, 0).unwrap());
        }
        (index, slots, dir)
    }

    #[test]
    fn test_pairs_get_similar_edges() {
        let (mut index, slots, _dir) = test_index(3);
        hebbian_update(&mut index, &slots, 0.1).unwrap();

        for &a in &slots {
            let edges = index.edges(a);
            assert_eq!(edges.len(), 2);
            for e in edges {
                assert_eq!(e.edge_type, EdgeType::Similar);
                assert!((e.weight - 0.1).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_repeated_updates_saturate_at_one() {
        let (mut index, slots, _dir) = test_index(2);
        let mut last = 0.0f32;
        for _ in 0..15 {
            hebbian_update(&mut index, &slots, 0.1).unwrap();
            let w = index.edges(slots[0])[0].weight;
            // monotone non-decreasing
            assert!(w >= last);
            last = w;
        }
        assert_eq!(last, 1.0);
        assert_eq!(index.edges(slots[1])[0].weight, 1.0);
    }

    #[test]
    fn test_strength_is_clamped() {
        let (mut index, slots, _dir) = test_index(2);
        hebbian_update(&mut index, &slots, 3.0).unwrap();
        assert!((index.edges(slots[0])[0].weight - MAX_STRENGTH).abs() < 1e-6);
    }
}
