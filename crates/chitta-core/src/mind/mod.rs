//! Mind - the engine façade
//!
//! One object owning the unified index, WAL, tiers, graph, and secondary
//! indexes. Every mutation appends its WAL record before touching state;
//! `remember` and `forget` fsync before returning (commit = WAL fsync),
//! lighter deltas sync at tick, snapshot, and close. All operations are
//! synchronous; the daemon serializes calls under one logical lock.

mod config;
mod recall;

pub use config::{
    MindConfig, DEFAULT_DIMENSIONS, DEFAULT_FEEDBACK_CAPACITY, DEFAULT_MAX_NODES,
    DEFAULT_WAL_BUDGET,
};
pub use recall::RecallQuery;

use lru::LruCache;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dynamics::{
    self, coherence, decay_pass, hebbian_update, settle, vitality, vitality_status,
};
use crate::embeddings::Embedder;
use crate::error::{ChittaError, Result};
use crate::graph::GraphStore;
use crate::index::{Bm25Index, TagIndex};
use crate::memory::{
    ActivationHit, Confidence, Edge, EdgeType, ConnectResult, MemoryStats, Node, NodeType,
    RememberOptions, TickReport, Triplet,
};
use crate::primitives::{NodeId, QuantizedVector};
use crate::storage::{
    sibling, upgrade_to_current, TieredStore, UnifiedIndex, WalRecord, WriteAheadLog,
};
use crate::time::MS_PER_DAY;

/// Activation floor for a node to join the Hebbian set during `resonate`
pub const HEBBIAN_ACTIVATION_MIN: f32 = 0.2;

/// Norm tolerance accepted for caller-supplied unit vectors
const UNIT_NORM_TOLERANCE: f32 = 0.02;

/// Queued feedback event, applied on `apply_feedback` or the next tick
#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    pub id: NodeId,
    pub helpful: bool,
    pub context: Option<String>,
    pub queued_at: i64,
}

/// Options for `forget`
#[derive(Debug, Clone, Copy, Default)]
pub struct ForgetOptions {
    /// Weaken the removed node's neighbors
    pub cascade: bool,
    /// Bridge in-neighbors to out-neighbors before removal
    pub rewire: bool,
}

/// The persistent semantic memory engine
pub struct Mind {
    config: MindConfig,
    base: PathBuf,
    index: UnifiedIndex,
    wal: WriteAheadLog,
    tiered: TieredStore,
    graph: GraphStore,
    tags: TagIndex,
    sparse: Bm25Index,
    embedder: Option<Box<dyn Embedder>>,
    feedback: VecDeque<FeedbackEvent>,
    query_cache: LruCache<String, Vec<f32>>,
    type_counts: HashMap<NodeType, u64>,
    graph_dirty: bool,
    closed: bool,
}

impl Mind {
    // ------------------------------------------------------------------
    // open / close
    // ------------------------------------------------------------------

    /// Open (or create) a database, replaying the WAL. The index is
    /// consistent when this returns.
    pub fn open(config: MindConfig, embedder: Option<Box<dyn Embedder>>) -> Result<Self> {
        if let Some(e) = &embedder {
            if e.dimensions() != config.dimensions as usize {
                return Err(ChittaError::InvalidParams(format!(
                    "embedder is {}-dimensional, index is {}",
                    e.dimensions(),
                    config.dimensions
                )));
            }
        }

        let base = config.resolve_base_path();
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let unified_path = sibling(&base, "unified");

        let index = if unified_path.exists() {
            match UnifiedIndex::open(&unified_path) {
                Ok(index) => index,
                Err(ChittaError::IncompatibleVersion { found, current }) if found < current => {
                    upgrade_to_current(&unified_path)?;
                    UnifiedIndex::open(&unified_path)?
                }
                Err(e) => return Err(e),
            }
        } else {
            UnifiedIndex::create(&unified_path, config.dimensions)?
        };

        let tiered = TieredStore::open(&base, config.hot_capacity)?;
        let graph = GraphStore::open(&sibling(&base, "graph"))?;
        let tags = TagIndex::open(&sibling(&base, "tags"));
        let query_cache =
            LruCache::new(NonZeroUsize::new(config.query_cache_size.max(1)).unwrap());

        let mut mind = Self {
            config,
            base: base.clone(),
            index,
            wal: WriteAheadLog::open(&sibling(&base, "wal"))?,
            tiered,
            graph,
            tags,
            sparse: Bm25Index::new(),
            embedder,
            feedback: VecDeque::new(),
            query_cache,
            type_counts: HashMap::new(),
            graph_dirty: false,
            closed: false,
        };

        mind.rebuild_derived_state()?;
        let replayed = mind.replay_wal()?;
        if replayed > 0 {
            info!(records = replayed, "replayed write-ahead log");
        }
        Ok(mind)
    }

    /// Rebuild the BM25 index, type counts, and (when the sidecar was lost)
    /// the tag index by streaming over the mapped state.
    fn rebuild_derived_state(&mut self) -> Result<()> {
        let rebuild_tags = self.tags.is_empty() && !self.index.is_empty();
        for slot in self.index.live_slots() {
            let meta = self.index.meta(slot);
            *self.type_counts.entry(meta.node_type).or_default() += 1;
            if meta.payload_len > 0 {
                let id = self.index.id_at(slot);
                let bytes =
                    self.tiered
                        .fetch(id, meta.payload_off, meta.payload_len, meta.cold)?;
                self.sparse
                    .add_document(slot, &String::from_utf8_lossy(&bytes));
            }
            if rebuild_tags {
                for tag in self.index.tags(slot) {
                    self.tags.add(slot, &tag);
                }
            }
        }
        if rebuild_tags {
            warn!("tag sidecar was missing or stale, rebuilt from node tags");
        }
        Ok(())
    }

    fn replay_wal(&mut self) -> Result<u64> {
        // the log is walked with the engine's own apply path, so replay and
        // live mutation can never diverge
        let path = sibling(&self.base, "wal");
        let mut records = Vec::new();
        let applied = WriteAheadLog::replay(&path, |record| {
            records.push(record);
            Ok(())
        })?;
        for record in records {
            self.apply_record(record)?;
        }
        Ok(applied)
    }

    /// Flush and sync everything; subsequent operations fail
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.wal.sync()?;
        self.index.sync()?;
        self.tiered.sync()?;
        self.tags.save()?;
        self.graph.save()?;
        self.graph_dirty = false;
        self.closed = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ChittaError::InvalidParams("engine is closed".into()));
        }
        Ok(())
    }

    fn now_ms(&self) -> i64 {
        self.config.clock.now_ms()
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub(crate) fn index(&self) -> &UnifiedIndex {
        &self.index
    }

    pub(crate) fn tags_index(&self) -> &TagIndex {
        &self.tags
    }

    pub(crate) fn sparse_index(&self) -> &Bm25Index {
        &self.sparse
    }

    pub(crate) fn embedder(&self) -> Option<&dyn Embedder> {
        self.embedder.as_deref()
    }

    pub(crate) fn realm_scope(&self, name: &str) -> Result<u16> {
        self.graph
            .realms
            .id_of(name)
            .ok_or_else(|| ChittaError::UnknownRealm(name.to_string()))
    }

    pub(crate) fn realm_visible(&self, realm: u16, scope: u16) -> bool {
        self.graph.realms.visible_from(realm, scope)
    }

    pub(crate) fn query_vector(&mut self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.query_cache.get(text) {
            return Ok(vector.clone());
        }
        let embedder = self.embedder.as_deref().ok_or(ChittaError::NoEmbedder)?;
        let vector = embedder.embed(text)?;
        self.query_cache.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    // ------------------------------------------------------------------
    // remember / get
    // ------------------------------------------------------------------

    /// Remember a text memory; the node is durable to the WAL on return
    pub fn remember(
        &mut self,
        text: &str,
        node_type: NodeType,
        options: RememberOptions,
    ) -> Result<NodeId> {
        self.ensure_open()?;
        if text.trim().is_empty() {
            return Err(ChittaError::InvalidParams("text must be non-empty".into()));
        }
        if self.embedder.is_none() {
            return Err(ChittaError::NoEmbedder);
        }
        let vector = self.query_vector(text)?;
        self.remember_vector(vector, node_type, Some(text.as_bytes().to_vec()), options)
    }

    /// Remember a pre-embedded memory. The vector must be unit length (the
    /// zero sentinel is accepted as "embedding pending").
    pub fn remember_vector(
        &mut self,
        vector: Vec<f32>,
        node_type: NodeType,
        payload: Option<Vec<u8>>,
        options: RememberOptions,
    ) -> Result<NodeId> {
        self.ensure_open()?;
        if vector.len() != self.config.dimensions as usize {
            return Err(ChittaError::InvalidParams(format!(
                "vector has {} lanes, index is {}-dimensional",
                vector.len(),
                self.config.dimensions
            )));
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm != 0.0 && (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(ChittaError::InvalidParams(format!(
                "vector norm {norm:.4} is not unit length"
            )));
        }
        self.check_quotas(node_type)?;

        let realm = match &options.realm {
            Some(name) => Some(self.realm_scope(name)?),
            None => None,
        };

        let now = self.now_ms();
        let mut tags = options.tags.clone();
        tags.sort();
        tags.dedup();
        let decay_rate = if node_type.is_protected() {
            0.0
        } else {
            options.decay_rate.unwrap_or(node_type.default_decay_rate()).max(0.0)
        };
        let node = Node {
            id: NodeId::generate(),
            node_type,
            vector: QuantizedVector::quantize(&vector),
            confidence: Confidence::new(options.confidence.unwrap_or(0.5), now),
            decay_rate,
            epsilon: options.epsilon.unwrap_or(1.0).clamp(0.0, 1.0),
            created_at: now,
            accessed_at: now,
            payload: payload.unwrap_or_default(),
            tags,
            edges: Vec::new(),
            realm: realm.map(|id| self.graph.realms.name(id).to_string()),
        };

        self.wal.append(&WalRecord::FullNode(node.clone()))?;
        self.wal.sync()?;
        self.apply_full_node(&node)?;
        debug!(id = %node.id, node_type = %node.node_type, "remembered");
        Ok(node.id)
    }

    fn check_quotas(&self, node_type: NodeType) -> Result<()> {
        if self.index.len() >= self.config.max_nodes {
            return Err(ChittaError::QuotaExceeded(format!(
                "global quota of {} nodes",
                self.config.max_nodes
            )));
        }
        if let Some(&quota) = self.config.type_quotas.get(&node_type) {
            let used = self.type_counts.get(&node_type).copied().unwrap_or(0);
            if used >= quota {
                return Err(ChittaError::QuotaExceeded(format!(
                    "type quota of {quota} {node_type} nodes"
                )));
            }
        }
        Ok(())
    }

    /// Node snapshot, or None. Reads touch `accessed_at`.
    pub fn get(&mut self, id: NodeId) -> Result<Option<Node>> {
        self.ensure_open()?;
        let Some(slot) = self.index.slot_of(id) else {
            return Ok(None);
        };
        let now = self.now_ms();
        self.wal.append(&WalRecord::TouchDelta { id, accessed_at: now })?;
        self.index.touch(slot, now);
        Ok(Some(self.assemble_node(slot)?))
    }

    pub(crate) fn assemble_node(&mut self, slot: u64) -> Result<Node> {
        let id = self.index.id_at(slot);
        let meta = self.index.meta(slot);
        let payload = if meta.payload_len > 0 {
            self.tiered
                .fetch(id, meta.payload_off, meta.payload_len, meta.cold)?
        } else {
            Vec::new()
        };
        Ok(Node {
            id,
            node_type: meta.node_type,
            vector: self.index.vector(slot),
            confidence: meta.confidence,
            decay_rate: meta.decay_rate,
            epsilon: meta.epsilon,
            created_at: meta.created_at,
            accessed_at: meta.accessed_at,
            payload,
            tags: self.index.tags(slot),
            edges: self.index.edges(slot),
            realm: if meta.realm == 0 {
                None
            } else {
                Some(self.graph.realms.name(meta.realm).to_string())
            },
        })
    }

    /// Number of live nodes
    pub fn size(&self) -> u64 {
        self.index.len()
    }

    // ------------------------------------------------------------------
    // edges (engine-internal writers share this path)
    // ------------------------------------------------------------------

    /// Add or update an outbound edge. The target must be known or the
    /// write is refused.
    pub fn add_edge(&mut self, from: NodeId, edge: Edge) -> Result<()> {
        self.ensure_open()?;
        let slot = self.index.slot_of(from).ok_or(ChittaError::UnknownNode(from))?;
        if !self.index.contains(edge.target) {
            return Err(ChittaError::UnknownNode(edge.target));
        }
        self.wal.append(&WalRecord::EdgeDelta {
            id: from,
            edge: edge.clone(),
            add: true,
        })?;
        self.index.upsert_edge(slot, &edge)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // graph / realms
    // ------------------------------------------------------------------

    /// Connect a triplet; idempotent by (s, p, o). An opposing
    /// supports/contradicts fact over the same pair is annotated, never
    /// retracted.
    pub fn connect(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        weight: f32,
    ) -> Result<ConnectResult> {
        self.ensure_open()?;
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            return Err(ChittaError::InvalidParams(
                "subject, predicate, and object must be non-empty".into(),
            ));
        }
        let opposing = match predicate {
            "supports" => Some("contradicts"),
            "contradicts" => Some("supports"),
            _ => None,
        };
        let conflict = opposing.is_some_and(|p| {
            !self.graph.triplets.query(Some(subject), Some(p), Some(object)).is_empty()
        });
        if conflict {
            warn!(subject, predicate, object, "conflicting facts recorded side by side");
        }

        let weight = weight.clamp(0.0, 1.0);
        self.graph.triplets.connect(subject, predicate, object, weight);
        self.graph.save()?;
        Ok(ConnectResult {
            triplet: Triplet {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                object: object.to_string(),
                weight,
            },
            conflict,
        })
    }

    /// Matching triplets; unbound positions are wildcards
    pub fn query_graph(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<Triplet> {
        self.graph.triplets.query(subject, predicate, object)
    }

    /// Remove a triplet
    pub fn disconnect(&mut self, subject: &str, predicate: &str, object: &str) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.graph.triplets.remove(subject, predicate, object);
        if removed {
            self.graph.save()?;
        }
        Ok(removed)
    }

    /// Define a realm under an existing parent
    pub fn define_realm(&mut self, name: &str, parent: &str) -> Result<()> {
        self.ensure_open()?;
        self.graph.realms.define(name, parent)?;
        self.graph.save()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // confidence
    // ------------------------------------------------------------------

    /// Observe the node at `mu + delta` (Bayesian-style strengthening)
    pub fn strengthen(&mut self, id: NodeId, delta: f32) -> Result<Confidence> {
        self.observe_confidence(id, delta.abs())
    }

    /// Observe the node at `mu - delta`
    pub fn weaken(&mut self, id: NodeId, delta: f32) -> Result<Confidence> {
        self.observe_confidence(id, -delta.abs())
    }

    fn observe_confidence(&mut self, id: NodeId, delta: f32) -> Result<Confidence> {
        self.ensure_open()?;
        let slot = self.index.slot_of(id).ok_or(ChittaError::UnknownNode(id))?;
        let now = self.now_ms();
        let mut confidence = self.index.meta(slot).confidence;
        confidence.observe((confidence.mu + delta).clamp(0.0, 1.0), now);
        self.wal.append(&WalRecord::ConfidenceDelta { id, confidence })?;
        self.index.set_confidence(slot, &confidence);
        Ok(confidence)
    }

    // ------------------------------------------------------------------
    // feedback
    // ------------------------------------------------------------------

    /// Queue a feedback event; applied on `apply_feedback` or the next tick
    pub fn feedback(&mut self, id: NodeId, helpful: bool, context: Option<String>) -> Result<()> {
        self.ensure_open()?;
        if !self.index.contains(id) {
            return Err(ChittaError::UnknownNode(id));
        }
        if self.feedback.len() >= self.config.feedback_capacity {
            self.feedback.pop_front();
            warn!("feedback queue overflow, dropped oldest event");
        }
        self.feedback.push_back(FeedbackEvent {
            id,
            helpful,
            context,
            queued_at: self.now_ms(),
        });
        Ok(())
    }

    /// Drain the feedback queue into confidence observations
    pub fn apply_feedback(&mut self) -> Result<u64> {
        self.ensure_open()?;
        let mut applied = 0u64;
        while let Some(event) = self.feedback.pop_front() {
            let delta = if event.helpful { 0.1 } else { -0.15 };
            match self.observe_confidence(event.id, delta) {
                Ok(_) => applied += 1,
                // the node may have been pruned since the event was queued
                Err(ChittaError::UnknownNode(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(applied)
    }

    /// Queued feedback events
    pub fn feedback_pending(&self) -> usize {
        self.feedback.len()
    }

    // ------------------------------------------------------------------
    // forget
    // ------------------------------------------------------------------

    /// Remove a node. Protected types are refused. `rewire` bridges
    /// in-neighbors to out-neighbors; `cascade` weakens both sides.
    pub fn forget(&mut self, id: NodeId, options: ForgetOptions) -> Result<()> {
        self.ensure_open()?;
        let slot = self.index.slot_of(id).ok_or(ChittaError::UnknownNode(id))?;
        let meta = self.index.meta(slot);
        if meta.node_type.is_protected() {
            return Err(ChittaError::Protected(id));
        }
        self.remove_node(id, slot, options)?;
        self.wal.sync()?;
        Ok(())
    }

    /// Shared removal path for `forget` and automatic pruning. The caller
    /// has already enforced the protection policy.
    fn remove_node(&mut self, id: NodeId, slot: u64, options: ForgetOptions) -> Result<()> {
        let out_edges = self.index.edges(slot);
        // in-neighbors found by scanning: edges are stored outbound only
        let in_neighbors: Vec<(u64, Edge)> = self
            .index
            .live_slots()
            .into_iter()
            .filter(|&s| s != slot)
            .flat_map(|s| {
                self.index
                    .edges(s)
                    .into_iter()
                    .filter(|e| e.target == id)
                    .map(move |e| (s, e))
            })
            .collect();

        if options.rewire {
            for &(in_slot, ref in_edge) in &in_neighbors {
                let from = self.index.id_at(in_slot);
                for out_edge in &out_edges {
                    if out_edge.target == from || !self.index.contains(out_edge.target) {
                        continue;
                    }
                    let bridge = Edge {
                        target: out_edge.target,
                        edge_type: EdgeType::RelatesTo,
                        weight: (in_edge.weight * out_edge.weight).clamp(0.0, 1.0),
                    };
                    self.wal.append(&WalRecord::EdgeDelta {
                        id: from,
                        edge: bridge.clone(),
                        add: true,
                    })?;
                    self.index.upsert_edge(in_slot, &bridge)?;
                }
            }
        }

        if options.cascade {
            let mut neighbors: Vec<NodeId> =
                in_neighbors.iter().map(|&(s, _)| self.index.id_at(s)).collect();
            neighbors.extend(out_edges.iter().map(|e| e.target));
            neighbors.sort();
            neighbors.dedup();
            for neighbor in neighbors {
                if self.index.contains(neighbor) {
                    let _ = self.observe_confidence(neighbor, -0.05)?;
                }
            }
        }

        // drop dangling in-edges
        for &(in_slot, ref in_edge) in &in_neighbors {
            let from = self.index.id_at(in_slot);
            self.wal.append(&WalRecord::EdgeDelta {
                id: from,
                edge: in_edge.clone(),
                add: false,
            })?;
            self.index.remove_edge(in_slot, id, in_edge.edge_type)?;
        }

        let meta = self.index.meta(slot);
        self.wal.append(&WalRecord::RemoveNode { id })?;
        if meta.payload_len > 0 {
            let bytes = self
                .tiered
                .fetch(id, meta.payload_off, meta.payload_len, meta.cold)?;
            self.sparse
                .remove_document(slot, &String::from_utf8_lossy(&bytes));
        }
        self.tags.remove_slot(slot);
        self.tiered.evict(id);
        let count = self.type_counts.entry(meta.node_type).or_default();
        *count = count.saturating_sub(1);
        self.index.remove(id)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // tick
    // ------------------------------------------------------------------

    /// One dynamics cycle: decay, prune, feedback, tier migration,
    /// attractor settle, snapshot-if-due.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.ensure_open()?;
        let started = std::time::Instant::now();
        let now = self.now_ms();
        let mut report = TickReport::default();

        // decay + prune
        let outcome = decay_pass(&self.index, now, self.config.prune_threshold);
        for decayed in &outcome.decayed {
            self.wal.append(&WalRecord::ConfidenceDelta {
                id: decayed.id,
                confidence: decayed.confidence,
            })?;
            self.index.set_confidence(decayed.slot, &decayed.confidence);
        }
        report.decayed = outcome.decayed.len() as u64;
        for id in outcome.prune {
            if let Some(slot) = self.index.slot_of(id) {
                self.remove_node(id, slot, ForgetOptions::default())?;
                report.pruned += 1;
            }
        }

        report.feedback_applied = self.apply_feedback()?;

        // tier migration: warm payloads past the age threshold go cold
        for slot in self.index.live_slots() {
            let meta = self.index.meta(slot);
            if meta.cold || meta.payload_len == 0 {
                continue;
            }
            let age_days = ((now - meta.accessed_at).max(0) as f32) / MS_PER_DAY as f32;
            if age_days > self.config.cold_after_days {
                let id = self.index.id_at(slot);
                let cold_off = self.tiered.demote(id, meta.payload_off, meta.payload_len)?;
                self.index
                    .set_payload_ref(slot, cold_off, meta.payload_len, true);
                report.migrated_cold += 1;
            }
        }

        // attractor settle, WAL-logged as vector deltas
        if self.config.settle_iterations > 0 {
            for settled in settle(
                &self.index,
                self.config.settle_iterations,
                self.config.settle_max_nodes,
            ) {
                let id = self.index.id_at(settled.slot);
                self.wal.append(&WalRecord::VectorDelta {
                    id,
                    vector: settled.vector.clone(),
                })?;
                self.index.set_vector(settled.slot, &settled.vector)?;
                report.settled += 1;
            }
        }

        self.wal.sync()?;
        if self.wal.len_bytes() > self.config.wal_budget_bytes {
            report.snapshot = Some(self.snapshot()?);
        }

        report.coherence = coherence(&self.index, now);
        report.vitality = vitality(
            &self.index,
            now,
            self.tiered.hot_len(),
            self.config.hot_capacity,
        );
        report.duration_ms = started.elapsed().as_millis() as i64;
        debug!(
            decayed = report.decayed,
            pruned = report.pruned,
            coherence = report.coherence,
            vitality = report.vitality,
            "tick complete"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // snapshot / stats
    // ------------------------------------------------------------------

    /// Consistent on-disk image at the default sibling base; truncates the
    /// WAL. Returns the new snapshot counter.
    pub fn snapshot(&mut self) -> Result<u64> {
        let mut dest = self.base.as_os_str().to_os_string();
        dest.push("-snap");
        self.snapshot_to(&PathBuf::from(dest))
    }

    /// Snapshot to an explicit destination base. All writes that returned
    /// before this call are included.
    pub fn snapshot_to(&mut self, dest_base: &Path) -> Result<u64> {
        self.ensure_open()?;
        self.wal.sync()?;
        self.tiered.sync()?;
        self.tags.save()?;
        self.graph.save()?;
        let counter = self.index.bump_snapshot_counter();
        self.index.sync()?;

        if let Some(parent) = dest_base.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        for ext in ["unified", "payloads", "cold", "tags", "graph"] {
            let src = sibling(&self.base, ext);
            if src.exists() {
                std::fs::copy(&src, sibling(dest_base, ext))?;
            }
        }
        self.wal.truncate()?;
        info!(counter, dest = %dest_base.display(), "snapshot written");
        Ok(counter)
    }

    /// Current snapshot counter
    pub fn snapshot_counter(&self) -> u64 {
        self.index.snapshot_counter()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> MemoryStats {
        let now = self.now_ms();
        let psi = vitality(
            &self.index,
            now,
            self.tiered.hot_len(),
            self.config.hot_capacity,
        );
        let mut oldest: Option<i64> = None;
        let mut newest: Option<i64> = None;
        for slot in self.index.live_slots() {
            let created = self.index.meta(slot).created_at;
            oldest = Some(oldest.map_or(created, |o| o.min(created)));
            newest = Some(newest.map_or(created, |n| n.max(created)));
        }
        MemoryStats {
            total_nodes: self.index.len(),
            nodes_by_type: self
                .type_counts
                .iter()
                .filter(|&(_, &count)| count > 0)
                .map(|(t, &count)| (t.as_str().to_string(), count))
                .collect(),
            slot_capacity: self.index.slot_capacity(),
            wal_bytes: self.wal.len_bytes(),
            snapshot_counter: self.index.snapshot_counter(),
            hot_payloads: self.tiered.hot_len() as u64,
            cold_payloads: self.tiered.cold_records(),
            oldest_memory: oldest.and_then(chrono::DateTime::from_timestamp_millis),
            newest_memory: newest.and_then(chrono::DateTime::from_timestamp_millis),
            coherence: coherence(&self.index, now),
            vitality: psi,
            status: vitality_status(psi).to_string(),
        }
    }

    // ------------------------------------------------------------------
    // resonate support
    // ------------------------------------------------------------------

    pub(crate) fn spread_activation(
        &self,
        seeds: &[(NodeId, f32)],
        max_depth: usize,
    ) -> Vec<ActivationHit> {
        dynamics::spread(
            &self.index,
            seeds,
            dynamics::ActivationConfig {
                decay: self.config.activation.decay,
                max_depth,
            },
        )
    }

    pub(crate) fn hebbian_pass(&mut self, activated: &[NodeId], strength: f32) -> Result<usize> {
        let slots: Vec<u64> = activated
            .iter()
            .filter_map(|&id| self.index.slot_of(id))
            .collect();
        let written = hebbian_update(&mut self.index, &slots, strength)?;
        for (slot, edge) in &written {
            let id = self.index.id_at(*slot);
            self.wal.append(&WalRecord::EdgeDelta {
                id,
                edge: edge.clone(),
                add: true,
            })?;
        }
        Ok(written.len())
    }

    pub(crate) fn touch_slot(&mut self, slot: u64) -> Result<()> {
        let id = self.index.id_at(slot);
        let now = self.now_ms();
        self.wal.append(&WalRecord::TouchDelta { id, accessed_at: now })?;
        self.index.touch(slot, now);
        Ok(())
    }

    pub(crate) fn relevance_weights(&self) -> crate::search::RelevanceWeights {
        self.config.relevance
    }

    // ------------------------------------------------------------------
    // WAL application (shared by replay and live mutation)
    // ------------------------------------------------------------------

    fn apply_full_node(&mut self, node: &Node) -> Result<()> {
        let realm = match &node.realm {
            // replay may carry realms defined after the last graph save
            Some(name) => match self.graph.realms.id_of(name) {
                Some(id) => id,
                None => {
                    let id = self.graph.realms.define(name, crate::graph::ROOT_REALM)?;
                    self.graph_dirty = true;
                    id
                }
            },
            None => 0,
        };

        // update-in-place: retire the previous payload text and tags first
        if let Some(slot) = self.index.slot_of(node.id) {
            let old = self.index.meta(slot);
            if old.payload_len > 0 {
                let bytes =
                    self.tiered
                        .fetch(node.id, old.payload_off, old.payload_len, old.cold)?;
                self.sparse
                    .remove_document(slot, &String::from_utf8_lossy(&bytes));
            }
            self.tags.remove_slot(slot);
            let count = self.type_counts.entry(old.node_type).or_default();
            *count = count.saturating_sub(1);
        }

        let payload_off = if node.payload.is_empty() {
            0
        } else {
            self.tiered.store(node.id, &node.payload)?
        };
        let slot = self
            .index
            .insert(node, realm, payload_off, node.payload.len() as u32)?;
        if !node.payload.is_empty() {
            self.sparse
                .add_document(slot, &String::from_utf8_lossy(&node.payload));
        }
        for tag in &node.tags {
            self.tags.add(slot, tag);
        }
        *self.type_counts.entry(node.node_type).or_default() += 1;
        Ok(())
    }

    fn apply_record(&mut self, record: WalRecord) -> Result<()> {
        match record {
            WalRecord::FullNode(node) => self.apply_full_node(&node)?,
            WalRecord::TouchDelta { id, accessed_at } => {
                if let Some(slot) = self.index.slot_of(id) {
                    self.index.touch(slot, accessed_at);
                }
            }
            WalRecord::ConfidenceDelta { id, confidence } => {
                if let Some(slot) = self.index.slot_of(id) {
                    self.index.set_confidence(slot, &confidence);
                }
            }
            WalRecord::EdgeDelta { id, edge, add } => {
                if let Some(slot) = self.index.slot_of(id) {
                    if add {
                        self.index.upsert_edge(slot, &edge)?;
                    } else {
                        self.index.remove_edge(slot, edge.target, edge.edge_type)?;
                    }
                }
            }
            WalRecord::TagDelta { id, tag, add } => {
                if let Some(slot) = self.index.slot_of(id) {
                    if add {
                        self.index.add_tag(slot, &tag)?;
                        self.tags.add(slot, &tag);
                    } else {
                        self.index.remove_tag(slot, &tag)?;
                        self.tags.remove(slot, &tag);
                    }
                }
            }
            WalRecord::RemoveNode { id } => {
                if let Some(slot) = self.index.slot_of(id) {
                    let meta = self.index.meta(slot);
                    if meta.payload_len > 0 {
                        let bytes = self.tiered.fetch(
                            id,
                            meta.payload_off,
                            meta.payload_len,
                            meta.cold,
                        )?;
                        self.sparse
                            .remove_document(slot, &String::from_utf8_lossy(&bytes));
                    }
                    self.tags.remove_slot(slot);
                    self.tiered.evict(id);
                    let count = self.type_counts.entry(meta.node_type).or_default();
                    *count = count.saturating_sub(1);
                    self.index.remove(id)?;
                }
            }
            WalRecord::VectorDelta { id, vector } => {
                if let Some(slot) = self.index.slot_of(id) {
                    self.index.set_vector(slot, &vector)?;
                }
            }
        }
        Ok(())
    }

    /// Add or remove a tag on a node. Removing a tag with no postings
    /// anywhere is a referential error.
    pub fn set_tag(&mut self, id: NodeId, tag: &str, add: bool) -> Result<()> {
        self.ensure_open()?;
        let slot = self.index.slot_of(id).ok_or(ChittaError::UnknownNode(id))?;
        if tag.is_empty() {
            return Err(ChittaError::InvalidParams("tag must be non-empty".into()));
        }
        if !add && !self.tags.has_tag(tag) {
            return Err(ChittaError::UnknownTag(tag.to_string()));
        }
        self.wal.append(&WalRecord::TagDelta {
            id,
            tag: tag.to_string(),
            add,
        })?;
        if add {
            self.index.add_tag(slot, tag)?;
            self.tags.add(slot, tag);
        } else {
            self.index.remove_tag(slot, tag)?;
            self.tags.remove(slot, tag);
        }
        Ok(())
    }

    /// Flush dirty state without snapshotting
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.wal.sync()?;
        self.index.sync()?;
        self.tiered.sync()?;
        if self.graph_dirty {
            self.graph.save()?;
            self.graph_dirty = false;
        }
        Ok(())
    }
}

impl Drop for Mind {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("close on drop failed: {e}");
            }
        }
    }
}
