//! Engine configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::dynamics::{ActivationConfig, PRUNE_THRESHOLD};
use crate::memory::NodeType;
use crate::search::RelevanceWeights;
use crate::storage::DEFAULT_HOT_CAPACITY;
use crate::time::{Clock, SystemClock};

/// Default embedding dimensionality
pub const DEFAULT_DIMENSIONS: u32 = 256;
/// WAL byte budget before a snapshot is forced
pub const DEFAULT_WAL_BUDGET: u64 = 64 << 20;
/// Bounded feedback queue size
pub const DEFAULT_FEEDBACK_CAPACITY: usize = 1024;
/// Global node quota
pub const DEFAULT_MAX_NODES: u64 = 1_000_000;

/// Engine configuration with sane defaults
#[derive(Clone)]
pub struct MindConfig {
    /// Database base path; sibling files derive from it. `None` resolves a
    /// platform data directory.
    pub base_path: Option<PathBuf>,
    /// Vector lanes; must match the attached embedder
    pub dimensions: u32,
    /// Soul-aware relevance weights
    pub relevance: RelevanceWeights,
    /// Effective-confidence floor under which nodes are pruned
    pub prune_threshold: f32,
    /// Hot payload cache entries
    pub hot_capacity: usize,
    /// Days since last access before a payload migrates cold
    pub cold_after_days: f32,
    /// WAL bytes that force a snapshot at the next tick
    pub wal_budget_bytes: u64,
    /// Feedback queue bound; overflow drops oldest
    pub feedback_capacity: usize,
    /// Global node quota
    pub max_nodes: u64,
    /// Per-type node quotas
    pub type_quotas: HashMap<NodeType, u64>,
    /// Query-embedding LRU entries
    pub query_cache_size: usize,
    /// Spreading-activation defaults for `resonate`
    pub activation: ActivationConfig,
    /// Attractor settling passes per tick
    pub settle_iterations: usize,
    /// Most-connected nodes considered by settling
    pub settle_max_nodes: usize,
    /// Engine clock; swap in a manual clock to drive decay in tests
    pub clock: Arc<dyn Clock>,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            dimensions: DEFAULT_DIMENSIONS,
            relevance: RelevanceWeights::default(),
            prune_threshold: PRUNE_THRESHOLD,
            hot_capacity: DEFAULT_HOT_CAPACITY,
            cold_after_days: 30.0,
            wal_budget_bytes: DEFAULT_WAL_BUDGET,
            feedback_capacity: DEFAULT_FEEDBACK_CAPACITY,
            max_nodes: DEFAULT_MAX_NODES,
            type_quotas: HashMap::new(),
            query_cache_size: 256,
            activation: ActivationConfig::default(),
            settle_iterations: 2,
            settle_max_nodes: 64,
            clock: Arc::new(SystemClock),
        }
    }
}

impl MindConfig {
    /// Resolve the database base path: explicit config, else the platform
    /// data directory (`chitta/memory`).
    pub fn resolve_base_path(&self) -> PathBuf {
        if let Some(path) = &self.base_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "chitta")
            .map(|dirs| dirs.data_dir().join("memory"))
            .unwrap_or_else(|| PathBuf::from("chitta-memory"))
    }
}

impl std::fmt::Debug for MindConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MindConfig")
            .field("base_path", &self.base_path)
            .field("dimensions", &self.dimensions)
            .field("prune_threshold", &self.prune_threshold)
            .field("hot_capacity", &self.hot_capacity)
            .field("max_nodes", &self.max_nodes)
            .finish_non_exhaustive()
    }
}
