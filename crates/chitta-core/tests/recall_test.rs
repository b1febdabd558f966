//! End-to-end recall scenarios against a real database directory

use chitta_core::{
    ChittaError, HashEmbedder, ManualClock, Mind, MindConfig, NodeType, RecallFilters,
    RecallQuery, RememberOptions, SearchMode, ROOT_REALM,
};
use tempfile::TempDir;

const DIMS: u32 = 32;

fn axis(main: usize, main_value: f32, side: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS as usize];
    v[main] = main_value;
    v[side] = (1.0 - main_value * main_value).sqrt();
    v
}

/// Embedder pinning the scenario vectors: cos(red, crimson) = 0.98,
/// cos(red, ocean) = 0.05
fn scenario_embedder() -> HashEmbedder {
    let mut e = HashEmbedder::new(DIMS as usize);
    e.pin("red", {
        let mut v = vec![0.0f32; DIMS as usize];
        v[0] = 1.0;
        v
    });
    e.pin("crimson", axis(0, 0.98, 1));
    e.pin("ocean", axis(0, 0.05, 2));
    e
}

fn open_mind(dir: &TempDir, embedder: HashEmbedder) -> Mind {
    let config = MindConfig {
        base_path: Some(dir.path().join("db")),
        dimensions: DIMS,
        ..Default::default()
    };
    Mind::open(config, Some(Box::new(embedder))).unwrap()
}

#[test]
fn insert_then_recall_ranks_by_similarity() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_mind(&dir, scenario_embedder());

    let red = mind
        .remember("red", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    let ocean = mind
        .remember("ocean", NodeType::Wisdom, RememberOptions::default())
        .unwrap();

    let hits = mind
        .recall(
            RecallQuery::Text("crimson".into()),
            2,
            None,
            SearchMode::Dense,
            &RecallFilters::default(),
        )
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, red);
    assert!(hits[0].similarity >= 0.95, "red similarity {}", hits[0].similarity);
    assert_eq!(hits[1].id, ocean);
    assert!(hits[1].similarity <= 0.1, "ocean similarity {}", hits[1].similarity);
}

#[test]
fn recall_returns_at_most_k_deduplicated_sorted() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_mind(&dir, HashEmbedder::new(DIMS as usize));

    for i in 0..20 {
        mind.remember(
            &format!("memory about rust topic number {i}"),
            NodeType::Wisdom,
            RememberOptions::default(),
        )
        .unwrap();
    }

    for k in [1usize, 3, 7, 50] {
        let hits = mind
            .recall(
                RecallQuery::Text("rust topic".into()),
                k,
                None,
                SearchMode::Hybrid,
                &RecallFilters::default(),
            )
            .unwrap();
        assert!(hits.len() <= k);
        let mut ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), hits.len(), "hits must be deduplicated by id");
        for w in hits.windows(2) {
            assert!(w[0].relevance >= w[1].relevance, "sorted by relevance");
        }
    }
}

#[test]
fn tag_filters_gate_results() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_mind(&dir, HashEmbedder::new(DIMS as usize));

    mind.remember(
        "tagged memory about lifetimes",
        NodeType::Wisdom,
        RememberOptions {
            tags: vec!["keep".into()],
            ..Default::default()
        },
    )
    .unwrap();
    mind.remember(
        "untagged memory about lifetimes",
        NodeType::Wisdom,
        RememberOptions::default(),
    )
    .unwrap();

    let require = RecallFilters {
        require_tags: vec!["keep".into()],
        ..Default::default()
    };
    let hits = mind
        .recall(
            RecallQuery::Text("lifetimes".into()),
            10,
            None,
            SearchMode::Hybrid,
            &require,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].tags.contains(&"keep".to_string()));

    let exclude = RecallFilters {
        exclude_tags: vec!["keep".into()],
        ..Default::default()
    };
    let hits = mind
        .recall(
            RecallQuery::Text("lifetimes".into()),
            10,
            None,
            SearchMode::Hybrid,
            &exclude,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].tags.is_empty());
}

#[test]
fn realm_scope_sees_ancestors_only() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_mind(&dir, HashEmbedder::new(DIMS as usize));

    mind.define_realm("work", ROOT_REALM).unwrap();
    mind.define_realm("project", "work").unwrap();

    mind.remember(
        "root level memory about deadlines",
        NodeType::Wisdom,
        RememberOptions::default(),
    )
    .unwrap();
    mind.remember(
        "work memory about deadlines",
        NodeType::Wisdom,
        RememberOptions {
            realm: Some("work".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let project_id = mind
        .remember(
            "project memory about deadlines",
            NodeType::Wisdom,
            RememberOptions {
                realm: Some("project".into()),
                ..Default::default()
            },
        )
        .unwrap();

    // from "work": root + work visible, project hidden
    let filters = RecallFilters {
        realm: Some("work".into()),
        ..Default::default()
    };
    let hits = mind
        .recall(
            RecallQuery::Text("deadlines".into()),
            10,
            None,
            SearchMode::Hybrid,
            &filters,
        )
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.id != project_id));

    // from "project": all three visible
    let filters = RecallFilters {
        realm: Some("project".into()),
        ..Default::default()
    };
    let hits = mind
        .recall(
            RecallQuery::Text("deadlines".into()),
            10,
            None,
            SearchMode::Hybrid,
            &filters,
        )
        .unwrap();
    assert_eq!(hits.len(), 3);

    // unknown realm is a referential error
    let filters = RecallFilters {
        realm: Some("nowhere".into()),
        ..Default::default()
    };
    assert!(matches!(
        mind.recall(
            RecallQuery::Text("deadlines".into()),
            10,
            None,
            SearchMode::Hybrid,
            &filters,
        ),
        Err(ChittaError::UnknownRealm(_))
    ));
}

#[test]
fn sparse_mode_works_without_embedder() {
    let dir = TempDir::new().unwrap();
    let config = MindConfig {
        base_path: Some(dir.path().join("db")),
        dimensions: DIMS,
        ..Default::default()
    };
    let mut mind = Mind::open(config, None).unwrap();

    // text remember needs the embedder
    assert!(matches!(
        mind.remember("anything", NodeType::Wisdom, RememberOptions::default()),
        Err(ChittaError::NoEmbedder)
    ));

    // pre-embedded insert with payload still works
    let mut vector = vec![0.0f32; DIMS as usize];
    vector[3] = 1.0;
    mind.remember_vector(
        vector,
        NodeType::Wisdom,
        Some(b"the payload mentions gardening".to_vec()),
        RememberOptions::default(),
    )
    .unwrap();

    // dense text recall fails, sparse succeeds
    assert!(matches!(
        mind.recall(
            RecallQuery::Text("gardening".into()),
            5,
            None,
            SearchMode::Dense,
            &RecallFilters::default(),
        ),
        Err(ChittaError::NoEmbedder)
    ));
    let hits = mind
        .recall(
            RecallQuery::Text("gardening".into()),
            5,
            None,
            SearchMode::Sparse,
            &RecallFilters::default(),
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn quota_refuses_inserts() {
    let dir = TempDir::new().unwrap();
    let config = MindConfig {
        base_path: Some(dir.path().join("db")),
        dimensions: DIMS,
        max_nodes: 2,
        clock: ManualClock::new(),
        ..Default::default()
    };
    let mut mind = Mind::open(config, Some(Box::new(HashEmbedder::new(DIMS as usize)))).unwrap();

    mind.remember("one", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    mind.remember("two", NodeType::Wisdom, RememberOptions::default())
        .unwrap();
    assert!(matches!(
        mind.remember("three", NodeType::Wisdom, RememberOptions::default()),
        Err(ChittaError::QuotaExceeded(_))
    ));
}

#[test]
fn get_returns_stored_type_and_vector() {
    let dir = TempDir::new().unwrap();
    let mut mind = open_mind(&dir, scenario_embedder());

    let id = mind
        .remember(
            "red",
            NodeType::Term,
            RememberOptions {
                confidence: Some(0.8),
                epsilon: Some(0.6),
                ..Default::default()
            },
        )
        .unwrap();

    let node = mind.get(id).unwrap().expect("node resolves");
    assert_eq!(node.id, id);
    assert_eq!(node.node_type, NodeType::Term);
    assert!((node.epsilon - 0.6).abs() < 1e-6);
    let stored = node.vector.dequantize();
    // lane tolerance 2^-6 against the pinned vector
    assert!((stored[0] - 1.0).abs() <= 2.0f32.powi(-6));
    for lane in stored.iter().skip(1) {
        assert!(lane.abs() <= 2.0f32.powi(-6));
    }

    assert!(mind.get(chitta_core::NodeId::generate()).unwrap().is_none());
}
