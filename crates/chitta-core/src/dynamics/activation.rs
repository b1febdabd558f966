//! Spreading activation
//!
//! Breadth-first expansion from seed nodes over outbound edges. A node's
//! activation is the sum of incoming `parent_activation * decay * weight`
//! contributions; activations under the floor are dropped to bound work.
//! Expansion is level-synchronous and each node expands at most once, so
//! the wave terminates within the depth limit even on cyclic graphs.

use std::collections::{HashMap, HashSet};

use crate::memory::ActivationHit;
use crate::primitives::NodeId;
use crate::storage::UnifiedIndex;

/// Activations under this floor are dropped
pub const ACTIVATION_FLOOR: f32 = 0.01;

/// Spreading parameters
#[derive(Debug, Clone, Copy)]
pub struct ActivationConfig {
    /// Per-hop decay factor in (0, 1]
    pub decay: f32,
    /// Maximum hops from any seed
    pub max_depth: usize,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            decay: 0.7,
            max_depth: 3,
        }
    }
}

/// Spread activation from seeds; returns (id, activation) sorted descending
pub fn spread(
    index: &UnifiedIndex,
    seeds: &[(NodeId, f32)],
    config: ActivationConfig,
) -> Vec<ActivationHit> {
    let decay = config.decay.clamp(f32::MIN_POSITIVE, 1.0);
    let mut total: HashMap<NodeId, f32> = HashMap::new();
    let mut frontier: Vec<(u64, f32)> = Vec::new();
    let mut expanded: HashSet<NodeId> = HashSet::new();

    for &(id, activation) in seeds {
        let Some(slot) = index.slot_of(id) else {
            continue;
        };
        if activation < ACTIVATION_FLOOR {
            continue;
        }
        *total.entry(id).or_default() += activation;
        frontier.push((slot, activation));
        expanded.insert(id);
    }

    for _ in 0..config.max_depth {
        if frontier.is_empty() {
            break;
        }
        // accumulate this wave's contributions per target
        let mut wave: HashMap<NodeId, f32> = HashMap::new();
        for &(slot, activation) in &frontier {
            for edge in index.edges(slot) {
                if index.slot_of(edge.target).is_none() {
                    continue;
                }
                let contribution = activation * decay * edge.weight;
                if contribution < ACTIVATION_FLOOR {
                    continue;
                }
                *wave.entry(edge.target).or_default() += contribution;
            }
        }

        frontier.clear();
        for (id, contribution) in wave {
            *total.entry(id).or_default() += contribution;
            if expanded.insert(id) {
                if let Some(slot) = index.slot_of(id) {
                    frontier.push((slot, contribution));
                }
            }
        }
    }

    let mut hits: Vec<ActivationHit> = total
        .into_iter()
        .filter(|&(_, a)| a >= ACTIVATION_FLOOR)
        .map(|(id, activation)| ActivationHit { id, activation })
        .collect();
    hits.sort_by(|a, b| {
        b.activation
            .partial_cmp(&a.activation)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}
