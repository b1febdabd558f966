//! Dynamics scenarios: Hebbian loops, decay and pruning, protection

use std::sync::Arc;

use chitta_core::{
    HashEmbedder, ManualClock, Mind, MindConfig, NodeType, RememberOptions,
};
use tempfile::TempDir;

const DIMS: u32 = 32;

fn axis_blend(weight: f32, side: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS as usize];
    v[0] = weight;
    v[side] = (1.0 - weight * weight).sqrt();
    v
}

/// Three texts near a shared query axis so resonate activates all of them
fn triad_embedder() -> HashEmbedder {
    let mut e = HashEmbedder::new(DIMS as usize);
    e.pin("the query", {
        let mut v = vec![0.0f32; DIMS as usize];
        v[0] = 1.0;
        v
    });
    e.pin("alpha memory", axis_blend(0.9, 1));
    e.pin("beta memory", axis_blend(0.9, 2));
    e.pin("gamma memory", axis_blend(0.9, 3));
    e
}

fn open_with(dir: &TempDir, embedder: HashEmbedder, clock: Arc<ManualClock>) -> Mind {
    let config = MindConfig {
        base_path: Some(dir.path().join("db")),
        dimensions: DIMS,
        clock,
        ..Default::default()
    };
    Mind::open(config, Some(Box::new(embedder))).unwrap()
}

#[test]
fn hebbian_loop_wires_and_saturates() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_with(&dir, triad_embedder(), ManualClock::new());

    let a = mind
        .remember("alpha memory", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let b = mind
        .remember("beta memory", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let c = mind
        .remember("gamma memory", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let ids = [a, b, c];

    let result = mind.resonate("the query", 3, 2, 0.1, vec![]).unwrap();
    assert_eq!(result.hits.len(), 3);
    for hit in &result.activated {
        if ids.contains(&hit.id) {
            assert!(hit.activation >= 0.2, "activation {}", hit.activation);
        }
    }

    // every ordered pair carries a Similar edge at the update strength
    for id in ids {
        let node = mind.get(id).unwrap().unwrap();
        let similar: Vec<_> = node
            .edges
            .iter()
            .filter(|e| e.edge_type == chitta_core::EdgeType::Similar)
            .collect();
        assert_eq!(similar.len(), 2);
        for edge in similar {
            assert!(ids.contains(&edge.target));
            assert!((edge.weight - 0.1).abs() < 1e-6);
        }
    }

    // weights are monotone non-decreasing and saturate at exactly 1.0
    let mut last = 0.1f32;
    for _ in 0..14 {
        mind.resonate("the query", 3, 2, 0.1, vec![]).unwrap();
        let weight = mind.get(a).unwrap().unwrap().edges[0].weight;
        assert!(weight >= last);
        last = weight;
    }
    for id in ids {
        let node = mind.get(id).unwrap().unwrap();
        for edge in node.edges.iter().filter(|e| e.edge_type == chitta_core::EdgeType::Similar) {
            assert_eq!(edge.weight, 1.0);
        }
    }
}

#[test]
fn decay_contracts_and_prunes_unprotected() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let mut mind = open_with(&dir, HashEmbedder::new(DIMS as usize), clock.clone());

    let wisdom = mind
        .remember(
            "perishable operational detail",
            NodeType::Wisdom,
            RememberOptions {
                confidence: Some(0.9),
                decay_rate: Some(0.05),
                ..Default::default()
            },
        )
        .unwrap();
    let invariant = mind
        .remember(
            "never commit secrets",
            NodeType::Invariant,
            RememberOptions {
                confidence: Some(0.9),
                ..Default::default()
            },
        )
        .unwrap();

    clock.advance_days(90);
    let report = mind.tick().unwrap();
    assert_eq!(report.decayed, 1);

    // one long-idle tick contracts mu most of the way to 0.5
    let node = mind.get(wisdom).unwrap();
    if let Some(node) = &node {
        assert!(node.confidence.mu < 0.55, "mu {}", node.confidence.mu);
        assert!(node.confidence.mu > 0.45);
    }

    // repeated ticks raise variance to its cap; effective confidence
    // collapses and the node is pruned
    let mut pruned = false;
    for _ in 0..25 {
        // get() touches accessed_at, so keep idle time accruing instead
        clock.advance_days(30);
        let report = mind.tick().unwrap();
        if report.pruned > 0 {
            pruned = true;
            break;
        }
    }
    assert!(pruned, "decayed node must eventually fall under the prune threshold");
    assert!(mind.get(wisdom).unwrap().is_none());

    // the invariant is exempt from the entire path
    let node = mind.get(invariant).unwrap().expect("invariants are never pruned");
    assert!((node.confidence.mu - 0.9).abs() < 1e-6);
}

#[test]
fn protected_types_refuse_forget() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_with(&dir, HashEmbedder::new(DIMS as usize), ManualClock::new());

    let belief = mind
        .remember("explicitness beats magic", NodeType::Belief, RememberOptions::default())
        .unwrap();
    assert!(matches!(
        mind.forget(belief, Default::default()),
        Err(chitta_core::ChittaError::Protected(_))
    ));
    assert!(mind.get(belief).unwrap().is_some());
}

#[test]
fn forget_with_rewire_bridges_neighbors() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_with(&dir, HashEmbedder::new(DIMS as usize), ManualClock::new());

    let a = mind
        .remember("upstream cause", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let middle = mind
        .remember("disposable middle step", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let b = mind
        .remember("downstream effect", NodeType::Wisdom, RememberOptions::default())
        .unwrap();

    mind.add_edge(
        a,
        chitta_core::Edge {
            target: middle,
            edge_type: chitta_core::EdgeType::Supports,
            weight: 0.8,
        },
    )
    .unwrap();
    mind.add_edge(
        middle,
        chitta_core::Edge {
            target: b,
            edge_type: chitta_core::EdgeType::Supports,
            weight: 0.5,
        },
    )
    .unwrap();

    mind.forget(
        middle,
        chitta_core::ForgetOptions {
            cascade: false,
            rewire: true,
        },
    )
    .unwrap();

    assert!(mind.get(middle).unwrap().is_none());
    let node = mind.get(a).unwrap().unwrap();
    let bridge = node
        .edges
        .iter()
        .find(|e| e.target == b)
        .expect("rewire bridges a to b");
    assert_eq!(bridge.edge_type, chitta_core::EdgeType::RelatesTo);
    assert!((bridge.weight - 0.4).abs() < 1e-6);
    // the dangling edge to the removed node is gone
    assert!(node.edges.iter().all(|e| e.target != middle));
}

#[test]
fn tick_reports_health_metrics() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_with(&dir, HashEmbedder::new(DIMS as usize), ManualClock::new());

    for i in 0..5 {
        mind.remember(
            &format!("healthy recent memory {i}"),
            NodeType::Wisdom,
            RememberOptions::default(),
        )
        .unwrap();
    }
    let report = mind.tick().unwrap();
    assert!(report.coherence > 0.0 && report.coherence <= 1.0);
    assert!(report.vitality > 0.0 && report.vitality <= 1.0);

    let stats = mind.stats();
    assert_eq!(stats.total_nodes, 5);
    assert_eq!(stats.nodes_by_type.get("wisdom"), Some(&5));
    assert!(!stats.status.is_empty());
}

#[test]
fn feedback_applies_on_tick() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_with(&dir, HashEmbedder::new(DIMS as usize), ManualClock::new());

    let id = mind
        .remember(
            "useful pattern",
            NodeType::Wisdom,
            RememberOptions {
                confidence: Some(0.5),
                ..Default::default()
            },
        )
        .unwrap();
    let before = mind.get(id).unwrap().unwrap().confidence;

    mind.feedback(id, true, Some("helped fix the build".into())).unwrap();
    assert_eq!(mind.feedback_pending(), 1);
    let report = mind.tick().unwrap();
    assert_eq!(report.feedback_applied, 1);
    assert_eq!(mind.feedback_pending(), 0);

    let after = mind.get(id).unwrap().unwrap().confidence;
    assert!(after.mu > before.mu);
    assert!(after.observations > before.observations);
}
