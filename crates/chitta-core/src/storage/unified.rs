//! Unified index
//!
//! One mapped file holding, in order: index header; id→slot open-addressed
//! hash; fixed-width NodeMeta array; quantized vector array; and a
//! connection-pool arena carrying edge lists, tag sets, and the hierarchical
//! ANN neighbor lists. All arena offsets are 64-bit and are recomputed from
//! the header on every access; nothing caches interior pointers across
//! calls.
//!
//! The slot hash is the only place identifiers live on disk; the slot→id
//! table is rebuilt from it at open, so `slot(id(slot)) == slot` holds for
//! every occupied slot by construction.
//!
//! Removal tombstones a slot. ANN links into a tombstoned (or reused) slot
//! are left in place: search recomputes similarity from live vectors, so a
//! stale link costs a little recall, never correctness.

use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ChittaError, Result};
use crate::memory::{Confidence, Edge, EdgeType, Node, NodeType};
use crate::primitives::{NodeId, QuantizedVector, hilbert_key};
use crate::storage::region::MappedRegion;

/// Magic for the unified file
pub const UNIFIED_MAGIC: [u8; 4] = *b"CHIT";
/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 3;

/// HNSW connectivity above level 0
pub const ANN_M: usize = 16;
/// HNSW connectivity at level 0
pub const ANN_M0: usize = 32;
/// Beam width while building
pub const EF_CONSTRUCTION: usize = 128;
/// Beam width while searching
pub const EF_SEARCH: usize = 64;

const IDX_HDR: u64 = 96;
const META_LEN: u64 = 80;
const HASH_ENTRY: u64 = 24;

const INITIAL_SLOTS: u64 = 1024;
const INITIAL_ARENA: u64 = 1 << 20;
/// Arena growth alignment
const ARENA_ALIGN: u64 = 64 << 20;

const FLAG_OCCUPIED: u8 = 0b0000_0001;
const FLAG_COLD: u8 = 0b0000_0010;

const HASH_TOMB: u64 = u64::MAX;

// index header field offsets (relative to payload start)
const IH_SLOT_CAP: u64 = 0;
const IH_SLOT_HIGH: u64 = 8;
const IH_LIVE: u64 = 16;
const IH_HASH_CAP: u64 = 24;
const IH_DIMS: u64 = 32;
const IH_ENTRY_SLOT: u64 = 40; // slot + 1; 0 = empty graph
const IH_ENTRY_LEVEL: u64 = 48;
const IH_ARENA_USED: u64 = 56;
const IH_ARENA_CAP: u64 = 64;

// ============================================================================
// NODE META
// ============================================================================

/// Decoded 80-byte per-slot record
#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub node_type: NodeType,
    pub cold: bool,
    pub realm: u16,
    pub decay_rate: f32,
    pub epsilon: f32,
    pub confidence: Confidence,
    pub payload_len: u32,
    pub created_at: i64,
    pub accessed_at: i64,
    pub payload_off: u64,
    pub(crate) edge_off: u64,
    pub(crate) tag_off: u64,
    pub(crate) ann_off: u64,
}

// little-endian field access on the payload byte slice
fn ru16(b: &[u8], off: u64) -> u16 {
    u16::from_le_bytes(b[off as usize..off as usize + 2].try_into().unwrap())
}
fn ru32(b: &[u8], off: u64) -> u32 {
    u32::from_le_bytes(b[off as usize..off as usize + 4].try_into().unwrap())
}
fn ru64(b: &[u8], off: u64) -> u64 {
    u64::from_le_bytes(b[off as usize..off as usize + 8].try_into().unwrap())
}
fn ri64(b: &[u8], off: u64) -> i64 {
    i64::from_le_bytes(b[off as usize..off as usize + 8].try_into().unwrap())
}
fn rf32(b: &[u8], off: u64) -> f32 {
    f32::from_le_bytes(b[off as usize..off as usize + 4].try_into().unwrap())
}
fn wu16(b: &mut [u8], off: u64, v: u16) {
    b[off as usize..off as usize + 2].copy_from_slice(&v.to_le_bytes());
}
fn wu32(b: &mut [u8], off: u64, v: u32) {
    b[off as usize..off as usize + 4].copy_from_slice(&v.to_le_bytes());
}
fn wu64(b: &mut [u8], off: u64, v: u64) {
    b[off as usize..off as usize + 8].copy_from_slice(&v.to_le_bytes());
}
fn wi64(b: &mut [u8], off: u64, v: i64) {
    b[off as usize..off as usize + 8].copy_from_slice(&v.to_le_bytes());
}
fn wf32(b: &mut [u8], off: u64, v: f32) {
    b[off as usize..off as usize + 4].copy_from_slice(&v.to_le_bytes());
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    slot_cap: u64,
    hash_cap: u64,
    dims: u32,
    hash_off: u64,
    meta_off: u64,
    vec_off: u64,
    arena_off: u64,
    vec_stride: u64,
}

fn vec_stride(dims: u32) -> u64 {
    8 + (dims as u64).div_ceil(8) * 8
}

fn payload_area_len(slot_cap: u64, hash_cap: u64, dims: u32, arena_cap: u64) -> u64 {
    IDX_HDR + hash_cap * HASH_ENTRY + slot_cap * META_LEN + slot_cap * vec_stride(dims) + arena_cap
}

// ============================================================================
// UNIFIED INDEX
// ============================================================================

/// The unified mapped index (see module docs for the file layout)
pub struct UnifiedIndex {
    region: MappedRegion,
    path: PathBuf,
    /// slot → id, rebuilt from the hash region at open; zero id = free slot
    slot_ids: Vec<NodeId>,
    free_slots: Vec<u64>,
    /// (hilbert key, id) → slot, for pre-candidate pruning
    hilbert: BTreeMap<(u64, u128), u64>,
}

impl UnifiedIndex {
    /// Create a fresh index file
    pub fn create(path: &Path, dims: u32) -> Result<Self> {
        Self::create_with(path, dims, INITIAL_SLOTS, INITIAL_ARENA)
    }

    fn create_with(path: &Path, dims: u32, slot_cap: u64, arena_cap: u64) -> Result<Self> {
        let hash_cap = (slot_cap * 2).next_power_of_two();
        let capacity = payload_area_len(slot_cap, hash_cap, dims, arena_cap);
        let mut region = MappedRegion::create(path, UNIFIED_MAGIC, FORMAT_VERSION, capacity)?;
        let b = region.bytes_mut();
        wu64(b, IH_SLOT_CAP, slot_cap);
        wu64(b, IH_SLOT_HIGH, 0);
        wu64(b, IH_LIVE, 0);
        wu64(b, IH_HASH_CAP, hash_cap);
        wu32(b, IH_DIMS, dims);
        wu64(b, IH_ENTRY_SLOT, 0);
        wu32(b, IH_ENTRY_LEVEL, 0);
        wu64(b, IH_ARENA_USED, 8); // offset 0 is the "none" sentinel
        wu64(b, IH_ARENA_CAP, arena_cap);
        Ok(Self {
            region,
            path: path.to_path_buf(),
            slot_ids: vec![NodeId::zero(); slot_cap as usize],
            free_slots: Vec::new(),
            hilbert: BTreeMap::new(),
        })
    }

    /// Open an existing index, rebuilding the slot→id table, free list, and
    /// Hilbert ordering from the mapped bytes.
    pub fn open(path: &Path) -> Result<Self> {
        let region = MappedRegion::open(path, UNIFIED_MAGIC, FORMAT_VERSION)?;
        let mut index = Self {
            region,
            path: path.to_path_buf(),
            slot_ids: Vec::new(),
            free_slots: Vec::new(),
            hilbert: BTreeMap::new(),
        };
        index.rebuild_side_tables()?;
        Ok(index)
    }

    fn rebuild_side_tables(&mut self) -> Result<()> {
        let layout = self.layout();
        let b = self.region.bytes();
        self.slot_ids = vec![NodeId::zero(); layout.slot_cap as usize];

        for i in 0..layout.hash_cap {
            let off = layout.hash_off + i * HASH_ENTRY;
            let hi = ru64(b, off);
            let lo = ru64(b, off + 8);
            if (hi == 0 && lo == 0) || (hi == HASH_TOMB && lo == HASH_TOMB) {
                continue;
            }
            let slot = ru64(b, off + 16);
            if slot >= layout.slot_cap {
                return Err(ChittaError::CorruptHeader(format!(
                    "hash entry points at slot {slot} beyond capacity {}",
                    layout.slot_cap
                )));
            }
            self.slot_ids[slot as usize] = NodeId::from_halves(hi, lo);
        }

        let slot_high = ru64(b, IH_SLOT_HIGH);
        for slot in 0..slot_high {
            if self.slot_ids[slot as usize].is_zero() {
                self.free_slots.push(slot);
                continue;
            }
            let vector = self.vector(slot);
            if !vector.is_zero() {
                self.hilbert.insert(
                    (hilbert_key(&vector), self.slot_ids[slot as usize].as_u128()),
                    slot,
                );
            }
        }
        Ok(())
    }

    fn layout(&self) -> Layout {
        let b = self.region.bytes();
        let slot_cap = ru64(b, IH_SLOT_CAP);
        let hash_cap = ru64(b, IH_HASH_CAP);
        let dims = ru32(b, IH_DIMS);
        let stride = vec_stride(dims);
        let hash_off = IDX_HDR;
        let meta_off = hash_off + hash_cap * HASH_ENTRY;
        let vec_off = meta_off + slot_cap * META_LEN;
        let arena_off = vec_off + slot_cap * stride;
        Layout {
            slot_cap,
            hash_cap,
            dims,
            hash_off,
            meta_off,
            vec_off,
            arena_off,
            vec_stride: stride,
        }
    }

    pub fn dims(&self) -> u32 {
        self.layout().dims
    }

    pub fn len(&self) -> u64 {
        ru64(self.region.bytes(), IH_LIVE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot_capacity(&self) -> u64 {
        self.layout().slot_cap
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot_counter(&self) -> u64 {
        self.region.snapshot_counter()
    }

    pub fn bump_snapshot_counter(&mut self) -> u64 {
        self.region.bump_snapshot_counter()
    }

    pub fn sync(&self) -> Result<()> {
        self.region.sync()
    }

    // ------------------------------------------------------------------
    // id → slot hash
    // ------------------------------------------------------------------

    fn hash_index(id: NodeId, cap: u64) -> u64 {
        let mix = (id.hi() ^ id.lo()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        mix & (cap - 1)
    }

    /// Slot for an id, or None
    pub fn slot_of(&self, id: NodeId) -> Option<u64> {
        let layout = self.layout();
        let b = self.region.bytes();
        let mut i = Self::hash_index(id, layout.hash_cap);
        loop {
            let off = layout.hash_off + i * HASH_ENTRY;
            let hi = ru64(b, off);
            let lo = ru64(b, off + 8);
            if hi == 0 && lo == 0 {
                return None;
            }
            if hi == id.hi() && lo == id.lo() {
                return Some(ru64(b, off + 16));
            }
            i = (i + 1) & (layout.hash_cap - 1);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot_of(id).is_some()
    }

    /// Identifier occupying a slot (zero id when free)
    pub fn id_at(&self, slot: u64) -> NodeId {
        self.slot_ids[slot as usize]
    }

    fn hash_insert(&mut self, id: NodeId, slot: u64) {
        let layout = self.layout();
        let b = self.region.bytes_mut();
        let mut i = Self::hash_index(id, layout.hash_cap);
        loop {
            let off = layout.hash_off + i * HASH_ENTRY;
            let hi = ru64(b, off);
            let lo = ru64(b, off + 8);
            if (hi == 0 && lo == 0) || (hi == HASH_TOMB && lo == HASH_TOMB) {
                wu64(b, off, id.hi());
                wu64(b, off + 8, id.lo());
                wu64(b, off + 16, slot);
                return;
            }
            i = (i + 1) & (layout.hash_cap - 1);
        }
    }

    fn hash_remove(&mut self, id: NodeId) {
        let layout = self.layout();
        let b = self.region.bytes_mut();
        let mut i = Self::hash_index(id, layout.hash_cap);
        loop {
            let off = layout.hash_off + i * HASH_ENTRY;
            let hi = ru64(b, off);
            let lo = ru64(b, off + 8);
            if hi == 0 && lo == 0 {
                return;
            }
            if hi == id.hi() && lo == id.lo() {
                wu64(b, off, HASH_TOMB);
                wu64(b, off + 8, HASH_TOMB);
                wu64(b, off + 16, 0);
                return;
            }
            i = (i + 1) & (layout.hash_cap - 1);
        }
    }

    // ------------------------------------------------------------------
    // meta
    // ------------------------------------------------------------------

    fn meta_base(&self, slot: u64) -> u64 {
        self.layout().meta_off + slot * META_LEN
    }

    /// Decoded meta for an occupied slot
    pub fn meta(&self, slot: u64) -> NodeMeta {
        let m = self.meta_base(slot);
        let b = self.region.bytes();
        let flags = b[m as usize + 1];
        NodeMeta {
            node_type: NodeType::from_u8(b[m as usize]).unwrap_or_default(),
            cold: flags & FLAG_COLD != 0,
            realm: ru16(b, m + 2),
            decay_rate: rf32(b, m + 4),
            epsilon: rf32(b, m + 8),
            confidence: Confidence {
                mu: rf32(b, m + 12),
                variance: rf32(b, m + 16),
                observations: ru32(b, m + 20),
                updated_at: ru32(b, m + 24),
            },
            payload_len: ru32(b, m + 28),
            created_at: ri64(b, m + 32),
            accessed_at: ri64(b, m + 40),
            edge_off: ru64(b, m + 48),
            payload_off: ru64(b, m + 56),
            tag_off: ru64(b, m + 64),
            ann_off: ru64(b, m + 72),
        }
    }

    fn write_meta(&mut self, slot: u64, meta: &NodeMeta) {
        let m = self.meta_base(slot);
        let b = self.region.bytes_mut();
        b[m as usize] = meta.node_type.to_u8();
        b[m as usize + 1] = FLAG_OCCUPIED | if meta.cold { FLAG_COLD } else { 0 };
        wu16(b, m + 2, meta.realm);
        wf32(b, m + 4, meta.decay_rate);
        wf32(b, m + 8, meta.epsilon);
        wf32(b, m + 12, meta.confidence.mu);
        wf32(b, m + 16, meta.confidence.variance);
        wu32(b, m + 20, meta.confidence.observations);
        wu32(b, m + 24, meta.confidence.updated_at);
        wu32(b, m + 28, meta.payload_len);
        wi64(b, m + 32, meta.created_at);
        wi64(b, m + 40, meta.accessed_at);
        wu64(b, m + 48, meta.edge_off);
        wu64(b, m + 56, meta.payload_off);
        wu64(b, m + 64, meta.tag_off);
        wu64(b, m + 72, meta.ann_off);
    }

    pub fn touch(&mut self, slot: u64, accessed_at: i64) {
        let m = self.meta_base(slot);
        wi64(self.region.bytes_mut(), m + 40, accessed_at);
    }

    pub fn set_confidence(&mut self, slot: u64, confidence: &Confidence) {
        let m = self.meta_base(slot);
        let b = self.region.bytes_mut();
        wf32(b, m + 12, confidence.mu);
        wf32(b, m + 16, confidence.variance);
        wu32(b, m + 20, confidence.observations);
        wu32(b, m + 24, confidence.updated_at);
    }

    pub fn set_payload_ref(&mut self, slot: u64, offset: u64, len: u32, cold: bool) {
        let m = self.meta_base(slot);
        let b = self.region.bytes_mut();
        let flags = b[m as usize + 1];
        b[m as usize + 1] = if cold { flags | FLAG_COLD } else { flags & !FLAG_COLD };
        wu32(b, m + 28, len);
        wu64(b, m + 56, offset);
    }

    /// Every occupied slot, in slot order
    pub fn live_slots(&self) -> Vec<u64> {
        (0..ru64(self.region.bytes(), IH_SLOT_HIGH))
            .filter(|&s| !self.slot_ids[s as usize].is_zero())
            .collect()
    }

    // ------------------------------------------------------------------
    // vectors
    // ------------------------------------------------------------------

    /// Quantized vector at a slot
    pub fn vector(&self, slot: u64) -> QuantizedVector {
        let layout = self.layout();
        let base = layout.vec_off + slot * layout.vec_stride;
        let b = self.region.bytes();
        let scale = rf32(b, base);
        let lanes: Vec<i8> = b[(base + 8) as usize..(base + 8) as usize + layout.dims as usize]
            .iter()
            .map(|&x| x as i8)
            .collect();
        QuantizedVector::from_parts(lanes, scale)
    }

    fn write_vector(&mut self, slot: u64, vector: &QuantizedVector) {
        let layout = self.layout();
        let base = layout.vec_off + slot * layout.vec_stride;
        let b = self.region.bytes_mut();
        wf32(b, base, vector.scale());
        for (i, &lane) in vector.lanes().iter().enumerate() {
            b[(base + 8) as usize + i] = lane as u8;
        }
    }

    /// Replace a slot's vector, keeping the Hilbert ordering and ANN graph
    /// in step. A zero vector unlinks the node from search.
    pub fn set_vector(&mut self, slot: u64, vector: &QuantizedVector) -> Result<()> {
        let id = self.slot_ids[slot as usize];
        let old = self.vector(slot);
        if !old.is_zero() {
            self.hilbert.remove(&(hilbert_key(&old), id.as_u128()));
        }
        self.write_vector(slot, vector);
        if !vector.is_zero() {
            self.hilbert.insert((hilbert_key(vector), id.as_u128()), slot);
            self.ann_link(slot)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // arena
    // ------------------------------------------------------------------

    fn arena_alloc(&mut self, size: u64) -> Result<u64> {
        let size = size.div_ceil(8) * 8;
        let b = self.region.bytes();
        let used = ru64(b, IH_ARENA_USED);
        let cap = ru64(b, IH_ARENA_CAP);
        if used + size > cap {
            // 1.5x growth; the arena is the file tail so this extends in
            // place. Large arenas snap to the 64 MiB allocation alignment.
            let want = (used + size).max(cap + cap / 2);
            let new_cap = if want >= ARENA_ALIGN {
                want.div_ceil(ARENA_ALIGN) * ARENA_ALIGN
            } else {
                want.next_power_of_two()
            };
            let layout = self.layout();
            self.region.resize(layout.arena_off + new_cap)?;
            wu64(self.region.bytes_mut(), IH_ARENA_CAP, new_cap);
        }
        let off = ru64(self.region.bytes(), IH_ARENA_USED);
        wu64(self.region.bytes_mut(), IH_ARENA_USED, off + size);
        Ok(off)
    }

    fn arena_abs(&self, arena_rel: u64) -> u64 {
        self.layout().arena_off + arena_rel
    }

    // ------------------------------------------------------------------
    // edges
    // ------------------------------------------------------------------

    const EDGE_ENTRY: u64 = 24;

    /// Outbound edges of a slot
    pub fn edges(&self, slot: u64) -> Vec<Edge> {
        let meta = self.meta(slot);
        if meta.edge_off == 0 {
            return Vec::new();
        }
        let base = self.arena_abs(meta.edge_off);
        let b = self.region.bytes();
        let count = ru32(b, base + 4) as u64;
        let mut edges = Vec::with_capacity(count as usize);
        for i in 0..count {
            let e = base + 8 + i * Self::EDGE_ENTRY;
            let target = NodeId::from_halves(ru64(b, e), ru64(b, e + 8));
            let Some(edge_type) = EdgeType::from_u8(b[(e + 16) as usize]) else {
                continue;
            };
            edges.push(Edge {
                target,
                edge_type,
                weight: rf32(b, e + 20),
            });
        }
        edges
    }

    fn write_edge_entry(&mut self, base: u64, index: u64, edge: &Edge) {
        let e = base + 8 + index * Self::EDGE_ENTRY;
        let b = self.region.bytes_mut();
        wu64(b, e, edge.target.hi());
        wu64(b, e + 8, edge.target.lo());
        b[(e + 16) as usize] = edge.edge_type.to_u8();
        b[(e + 17) as usize] = 0;
        b[(e + 18) as usize] = 0;
        b[(e + 19) as usize] = 0;
        wf32(b, e + 20, edge.weight);
    }

    /// Replace a slot's whole edge list
    pub fn set_edges(&mut self, slot: u64, edges: &[Edge]) -> Result<()> {
        let cap = (edges.len() as u64).next_power_of_two().max(4);
        let off = self.arena_alloc(8 + cap * Self::EDGE_ENTRY)?;
        let base = self.arena_abs(off);
        {
            let b = self.region.bytes_mut();
            wu32(b, base, cap as u32);
            wu32(b, base + 4, edges.len() as u32);
        }
        for (i, edge) in edges.iter().enumerate() {
            self.write_edge_entry(base, i as u64, edge);
        }
        let m = self.meta_base(slot);
        wu64(self.region.bytes_mut(), m + 48, off);
        Ok(())
    }

    /// Add an edge, or overwrite the weight of an existing
    /// (target, edge_type) pair. Returns true when the edge is new.
    pub fn upsert_edge(&mut self, slot: u64, edge: &Edge) -> Result<bool> {
        let mut edges = self.edges(slot);
        if let Some(existing) = edges
            .iter_mut()
            .find(|e| e.target == edge.target && e.edge_type == edge.edge_type)
        {
            existing.weight = edge.weight;
            self.set_edges(slot, &edges)?;
            return Ok(false);
        }
        // append in place when the block has room
        let meta = self.meta(slot);
        if meta.edge_off != 0 {
            let base = self.arena_abs(meta.edge_off);
            let b = self.region.bytes();
            let cap = ru32(b, base) as u64;
            let count = ru32(b, base + 4) as u64;
            if count < cap {
                self.write_edge_entry(base, count, edge);
                wu32(self.region.bytes_mut(), base + 4, (count + 1) as u32);
                return Ok(true);
            }
        }
        edges.push(edge.clone());
        self.set_edges(slot, &edges)?;
        Ok(true)
    }

    /// Remove an edge; returns true when one was removed
    pub fn remove_edge(&mut self, slot: u64, target: NodeId, edge_type: EdgeType) -> Result<bool> {
        let mut edges = self.edges(slot);
        let before = edges.len();
        edges.retain(|e| !(e.target == target && e.edge_type == edge_type));
        if edges.len() == before {
            return Ok(false);
        }
        self.set_edges(slot, &edges)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // tags
    // ------------------------------------------------------------------

    /// Tag set of a slot
    pub fn tags(&self, slot: u64) -> Vec<String> {
        let meta = self.meta(slot);
        if meta.tag_off == 0 {
            return Vec::new();
        }
        let base = self.arena_abs(meta.tag_off);
        let b = self.region.bytes();
        let used = ru32(b, base + 4) as u64;
        let mut tags = Vec::new();
        let mut cursor = base + 8;
        let end = base + 8 + used;
        while cursor < end {
            let len = ru16(b, cursor) as u64;
            let bytes = &b[(cursor + 2) as usize..(cursor + 2 + len) as usize];
            tags.push(String::from_utf8_lossy(bytes).into_owned());
            cursor += 2 + len;
        }
        tags
    }

    /// Replace a slot's whole tag set
    pub fn set_tags(&mut self, slot: u64, tags: &[String]) -> Result<()> {
        let used: u64 = tags.iter().map(|t| 2 + t.len() as u64).sum();
        let cap = used.next_power_of_two().max(16);
        let off = self.arena_alloc(8 + cap)?;
        let base = self.arena_abs(off);
        {
            let b = self.region.bytes_mut();
            wu32(b, base, cap as u32);
            wu32(b, base + 4, used as u32);
            let mut cursor = base + 8;
            for tag in tags {
                wu16(b, cursor, tag.len() as u16);
                b[(cursor + 2) as usize..(cursor + 2) as usize + tag.len()]
                    .copy_from_slice(tag.as_bytes());
                cursor += 2 + tag.len() as u64;
            }
        }
        let m = self.meta_base(slot);
        wu64(self.region.bytes_mut(), m + 64, off);
        Ok(())
    }

    /// Add a tag if absent; returns true when added
    pub fn add_tag(&mut self, slot: u64, tag: &str) -> Result<bool> {
        let mut tags = self.tags(slot);
        if tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        tags.push(tag.to_string());
        self.set_tags(slot, &tags)?;
        Ok(true)
    }

    /// Remove a tag if present; returns true when removed
    pub fn remove_tag(&mut self, slot: u64, tag: &str) -> Result<bool> {
        let mut tags = self.tags(slot);
        let before = tags.len();
        tags.retain(|t| t != tag);
        if tags.len() == before {
            return Ok(false);
        }
        self.set_tags(slot, &tags)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // insert / remove
    // ------------------------------------------------------------------

    /// Insert a node, or update in place when the id is already known.
    /// Returns the slot.
    pub fn insert(
        &mut self,
        node: &Node,
        realm: u16,
        payload_off: u64,
        payload_len: u32,
    ) -> Result<u64> {
        if node.id.is_zero() {
            return Err(ChittaError::InvalidParams("zero node id is reserved".into()));
        }
        let layout = self.layout();
        if node.vector.dimensions() != layout.dims as usize {
            return Err(ChittaError::InvalidParams(format!(
                "vector has {} lanes, index is {}-dimensional",
                node.vector.dimensions(),
                layout.dims
            )));
        }

        if let Some(slot) = self.slot_of(node.id) {
            let old = self.meta(slot);
            let meta = NodeMeta {
                node_type: node.node_type,
                cold: false,
                realm,
                decay_rate: node.decay_rate,
                epsilon: node.epsilon,
                confidence: node.confidence,
                payload_len,
                created_at: old.created_at,
                accessed_at: node.accessed_at,
                edge_off: old.edge_off,
                payload_off,
                tag_off: old.tag_off,
                ann_off: old.ann_off,
            };
            self.write_meta(slot, &meta);
            self.set_vector(slot, &node.vector)?;
            self.set_edges(slot, &node.edges)?;
            self.set_tags(slot, &node.tags)?;
            return Ok(slot);
        }

        self.ensure_capacity()?;
        let slot = match self.free_slots.pop() {
            Some(s) => s,
            None => {
                let high = ru64(self.region.bytes(), IH_SLOT_HIGH);
                wu64(self.region.bytes_mut(), IH_SLOT_HIGH, high + 1);
                high
            }
        };

        let meta = NodeMeta {
            node_type: node.node_type,
            cold: false,
            realm,
            decay_rate: node.decay_rate,
            epsilon: node.epsilon,
            confidence: node.confidence,
            payload_len,
            created_at: node.created_at,
            accessed_at: node.accessed_at,
            edge_off: 0,
            payload_off,
            tag_off: 0,
            ann_off: 0,
        };
        self.write_meta(slot, &meta);
        self.write_vector(slot, &node.vector);
        self.hash_insert(node.id, slot);
        self.slot_ids[slot as usize] = node.id;
        if !node.edges.is_empty() {
            self.set_edges(slot, &node.edges)?;
        }
        if !node.tags.is_empty() {
            self.set_tags(slot, &node.tags)?;
        }
        if !node.vector.is_zero() {
            self.hilbert
                .insert((hilbert_key(&node.vector), node.id.as_u128()), slot);
            self.ann_link(slot)?;
        }
        let live = ru64(self.region.bytes(), IH_LIVE);
        wu64(self.region.bytes_mut(), IH_LIVE, live + 1);
        Ok(slot)
    }

    /// Tombstone a node. The slot becomes reusable; stale ANN links are
    /// tolerated by search.
    pub fn remove(&mut self, id: NodeId) -> Result<u64> {
        let slot = self.slot_of(id).ok_or(ChittaError::UnknownNode(id))?;
        let vector = self.vector(slot);
        if !vector.is_zero() {
            self.hilbert.remove(&(hilbert_key(&vector), id.as_u128()));
        }
        self.hash_remove(id);
        self.slot_ids[slot as usize] = NodeId::zero();
        // clear the meta record but keep the ANN block reference and the
        // vector bytes, so search can still route through the tombstone
        let ann_off = self.meta(slot).ann_off;
        let m = self.meta_base(slot);
        self.region.bytes_mut()[m as usize..(m + META_LEN) as usize].fill(0);
        wu64(self.region.bytes_mut(), m + 72, ann_off);
        self.free_slots.push(slot);
        let live = ru64(self.region.bytes(), IH_LIVE);
        wu64(self.region.bytes_mut(), IH_LIVE, live.saturating_sub(1));
        // drop the graph entry point if it pointed here
        let entry = ru64(self.region.bytes(), IH_ENTRY_SLOT);
        if entry == slot + 1 {
            let replacement = self
                .live_slots()
                .into_iter()
                .find(|&s| !self.vector(s).is_zero());
            let b = self.region.bytes_mut();
            match replacement {
                Some(s) => {
                    wu64(b, IH_ENTRY_SLOT, s + 1);
                    wu32(b, IH_ENTRY_LEVEL, 0);
                }
                None => {
                    wu64(b, IH_ENTRY_SLOT, 0);
                    wu32(b, IH_ENTRY_LEVEL, 0);
                }
            }
        }
        Ok(slot)
    }

    fn ensure_capacity(&mut self) -> Result<()> {
        let layout = self.layout();
        let b = self.region.bytes();
        let high = ru64(b, IH_SLOT_HIGH);
        let live = ru64(b, IH_LIVE);
        let slots_full = self.free_slots.is_empty() && high >= layout.slot_cap;
        let hash_crowded = live + 1 > layout.hash_cap * 7 / 10;
        if slots_full || hash_crowded {
            self.grow()?;
        }
        Ok(())
    }

    /// Rebuild into a sibling file at doubled slot capacity, then rename
    /// over the original. Slot assignments are preserved (tag postings and
    /// BM25 key by slot); hash tombstones clear and the arena compacts as a
    /// side effect.
    fn grow(&mut self) -> Result<()> {
        let layout = self.layout();
        let arena_cap = ru64(self.region.bytes(), IH_ARENA_CAP);
        let slot_high = ru64(self.region.bytes(), IH_SLOT_HIGH);
        let tmp_path = self.path.with_extension("unified.grow");
        let mut next =
            Self::create_with(&tmp_path, layout.dims, layout.slot_cap * 2, arena_cap)?;
        next.region.set_snapshot_counter(self.region.snapshot_counter());

        let mut live = 0u64;
        for slot in self.live_slots() {
            let id = self.slot_ids[slot as usize];
            let mut meta = self.meta(slot);
            let vector = self.vector(slot);
            let edges = self.edges(slot);
            let tags = self.tags(slot);
            meta.edge_off = 0;
            meta.tag_off = 0;
            meta.ann_off = 0;
            next.write_meta(slot, &meta);
            next.write_vector(slot, &vector);
            next.hash_insert(id, slot);
            next.slot_ids[slot as usize] = id;
            if !edges.is_empty() {
                next.set_edges(slot, &edges)?;
            }
            if !tags.is_empty() {
                next.set_tags(slot, &tags)?;
            }
            if !vector.is_zero() {
                next.hilbert.insert((hilbert_key(&vector), id.as_u128()), slot);
                next.ann_link(slot)?;
            }
            live += 1;
        }
        {
            let b = next.region.bytes_mut();
            wu64(b, IH_SLOT_HIGH, slot_high);
            wu64(b, IH_LIVE, live);
        }
        next.free_slots = (0..slot_high)
            .filter(|&s| next.slot_ids[s as usize].is_zero())
            .collect();
        next.sync()?;
        drop(next);
        std::fs::rename(&tmp_path, &self.path)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // ANN graph (hierarchical, bounded neighbor lists)
    // ------------------------------------------------------------------

    fn level_cap(level: u32) -> u64 {
        if level == 0 { ANN_M0 as u64 } else { ANN_M as u64 }
    }

    fn sample_level() -> u32 {
        let ml = 1.0 / (ANN_M as f64).ln();
        let u: f64 = rand::thread_rng().r#gen::<f64>().max(1e-12);
        ((-u.ln() * ml) as u32).min(12)
    }

    fn ann_levels(&self, ann_off: u64) -> u32 {
        if ann_off == 0 {
            return 0;
        }
        ru32(self.region.bytes(), self.arena_abs(ann_off))
    }

    /// Byte offset of a level's (cap, count, entries) block
    fn ann_level_base(&self, ann_off: u64, level: u32) -> u64 {
        let mut cursor = self.arena_abs(ann_off) + 8;
        for l in 0..level {
            let cap = ru32(self.region.bytes(), cursor) as u64;
            debug_assert_eq!(cap, Self::level_cap(l));
            cursor += 8 + cap * 12;
        }
        cursor
    }

    fn ann_neighbors(&self, slot: u64, level: u32) -> Vec<(u64, f32)> {
        let ann_off = self.meta(slot).ann_off;
        if ann_off == 0 || level >= self.ann_levels(ann_off) {
            return Vec::new();
        }
        let base = self.ann_level_base(ann_off, level);
        let b = self.region.bytes();
        let count = ru32(b, base + 4) as u64;
        (0..count)
            .map(|i| {
                let e = base + 8 + i * 12;
                (ru64(b, e), rf32(b, e + 8))
            })
            .collect()
    }

    fn ann_write_level(&mut self, slot: u64, level: u32, neighbors: &[(u64, f32)]) {
        let ann_off = self.meta(slot).ann_off;
        let base = self.ann_level_base(ann_off, level);
        let cap = Self::level_cap(level) as usize;
        let n = neighbors.len().min(cap);
        let b = self.region.bytes_mut();
        wu32(b, base + 4, n as u32);
        for (i, &(nb, dist)) in neighbors.iter().take(n).enumerate() {
            let e = base + 8 + i as u64 * 12;
            wu64(b, e, nb);
            wf32(b, e + 8, dist);
        }
    }

    fn ann_alloc(&mut self, slot: u64, levels: u32) -> Result<()> {
        let mut size = 8u64;
        for l in 0..levels {
            size += 8 + Self::level_cap(l) * 12;
        }
        let off = self.arena_alloc(size)?;
        let base = self.arena_abs(off);
        {
            let b = self.region.bytes_mut();
            wu32(b, base, levels);
            wu32(b, base + 4, 0);
            let mut cursor = base + 8;
            for l in 0..levels {
                wu32(b, cursor, Self::level_cap(l) as u32);
                wu32(b, cursor + 4, 0);
                cursor += 8 + Self::level_cap(l) * 12;
            }
        }
        let m = self.meta_base(slot);
        wu64(self.region.bytes_mut(), m + 72, off);
        Ok(())
    }

    fn slot_similarity(&self, a: u64, b: u64) -> f32 {
        self.vector(a).approx_cosine(&self.vector(b))
    }

    fn query_similarity(&self, query: &QuantizedVector, slot: u64) -> f32 {
        query.approx_cosine(&self.vector(slot))
    }

    /// Link a slot into the ANN graph (used at insert and on vector change).
    /// Re-linking an already-linked slot refreshes its neighbor lists.
    fn ann_link(&mut self, slot: u64) -> Result<()> {
        let meta = self.meta(slot);
        let assigned = if meta.ann_off == 0 {
            let level = Self::sample_level();
            self.ann_alloc(slot, level + 1)?;
            level
        } else {
            self.ann_levels(meta.ann_off) - 1
        };

        let entry = ru64(self.region.bytes(), IH_ENTRY_SLOT);
        if entry == 0 {
            let b = self.region.bytes_mut();
            wu64(b, IH_ENTRY_SLOT, slot + 1);
            wu32(b, IH_ENTRY_LEVEL, assigned);
            return Ok(());
        }
        let entry_slot = entry - 1;
        if entry_slot == slot {
            return Ok(());
        }
        let entry_level = ru32(self.region.bytes(), IH_ENTRY_LEVEL);
        let query = self.vector(slot);

        // greedy descent through levels above the assigned one
        let mut cur = entry_slot;
        let mut level = entry_level;
        while level > assigned {
            cur = self.greedy_step(&query, cur, level);
            level -= 1;
        }

        // connect on every level the node participates in
        let top = assigned.min(entry_level);
        for lvl in (0..=top).rev() {
            let candidates = self.search_layer(&query, &[cur], EF_CONSTRUCTION, lvl, slot);
            let m = Self::level_cap(lvl) as usize;
            let selected = self.select_neighbors(&candidates, m);
            self.ann_write_level(slot, lvl, &selected);
            for &(nb, dist) in &selected {
                self.ann_push_neighbor(nb, lvl, slot, dist)?;
            }
            if let Some(&(best, _)) = selected.first() {
                cur = best;
            }
        }

        if assigned > entry_level {
            let b = self.region.bytes_mut();
            wu64(b, IH_ENTRY_SLOT, slot + 1);
            wu32(b, IH_ENTRY_LEVEL, assigned);
        }
        Ok(())
    }

    fn greedy_step(&self, query: &QuantizedVector, start: u64, level: u32) -> u64 {
        let mut cur = start;
        let mut cur_sim = self.query_similarity(query, cur);
        loop {
            let mut improved = false;
            for (nb, _) in self.ann_neighbors(cur, level) {
                if self.slot_ids[nb as usize].is_zero() {
                    continue;
                }
                let sim = self.query_similarity(query, nb);
                if sim > cur_sim {
                    cur = nb;
                    cur_sim = sim;
                    improved = true;
                }
            }
            if !improved {
                return cur;
            }
        }
    }

    /// Bounded best-first expansion on one level. Returns (slot, distance)
    /// sorted ascending by distance; `exclude` keeps a node out of its own
    /// candidate list while linking.
    fn search_layer(
        &self,
        query: &QuantizedVector,
        entries: &[u64],
        ef: usize,
        level: u32,
        exclude: u64,
    ) -> Vec<(u64, f32)> {
        let mut visited: HashSet<u64> = HashSet::new();
        let mut frontier: Vec<(u64, f32)> = Vec::new();
        let mut results: Vec<(u64, f32)> = Vec::new();

        for &e in entries {
            if visited.insert(e) {
                let dist = 1.0 - self.query_similarity(query, e);
                frontier.push((e, dist));
                if e != exclude && !self.slot_ids[e as usize].is_zero() {
                    results.push((e, dist));
                }
            }
        }

        while let Some(best_idx) = frontier
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
        {
            let (node, dist) = frontier.swap_remove(best_idx);
            let worst = results
                .iter()
                .map(|&(_, d)| d)
                .fold(f32::NEG_INFINITY, f32::max);
            if results.len() >= ef && dist > worst {
                break;
            }
            for (nb, _) in self.ann_neighbors(node, level) {
                if !visited.insert(nb) {
                    continue;
                }
                let nd = 1.0 - self.query_similarity(query, nb);
                frontier.push((nb, nd));
                if nb != exclude && !self.slot_ids[nb as usize].is_zero() {
                    results.push((nb, nd));
                    if results.len() > ef {
                        // drop the current worst
                        if let Some(worst_idx) = results
                            .iter()
                            .enumerate()
                            .max_by(|a, b| {
                                a.1 .1
                                    .partial_cmp(&b.1 .1)
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .map(|(i, _)| i)
                        {
                            results.swap_remove(worst_idx);
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// "Keep the diverse best": prefer candidates closer to the target than
    /// to any already-selected neighbor, then fill remaining seats with the
    /// nearest of the skipped.
    fn select_neighbors(&self, candidates: &[(u64, f32)], m: usize) -> Vec<(u64, f32)> {
        let mut selected: Vec<(u64, f32)> = Vec::with_capacity(m);
        let mut skipped: Vec<(u64, f32)> = Vec::new();
        for &(cand, dist) in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected.iter().all(|&(kept, _)| {
                1.0 - self.slot_similarity(cand, kept) > dist
            });
            if diverse {
                selected.push((cand, dist));
            } else {
                skipped.push((cand, dist));
            }
        }
        for &(cand, dist) in &skipped {
            if selected.len() >= m {
                break;
            }
            selected.push((cand, dist));
        }
        selected
    }

    fn ann_push_neighbor(&mut self, slot: u64, level: u32, nb: u64, dist: f32) -> Result<()> {
        let ann_off = self.meta(slot).ann_off;
        if ann_off == 0 || level >= self.ann_levels(ann_off) {
            return Ok(());
        }
        let mut neighbors = self.ann_neighbors(slot, level);
        if neighbors.iter().any(|&(s, _)| s == nb) {
            return Ok(());
        }
        neighbors.push((nb, dist));
        let cap = Self::level_cap(level) as usize;
        if neighbors.len() > cap {
            neighbors.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            neighbors = self.select_neighbors(&neighbors, cap);
        }
        self.ann_write_level(slot, level, &neighbors);
        Ok(())
    }

    /// Approximate nearest neighbors by cosine. Hilbert-window pre-candidates
    /// seed the level-0 beam alongside the greedy descent.
    pub fn search(&self, query: &QuantizedVector, k: usize, ef: usize) -> Vec<(u64, f32)> {
        let entry = ru64(self.region.bytes(), IH_ENTRY_SLOT);
        if entry == 0 || k == 0 {
            return Vec::new();
        }
        let entry_slot = entry - 1;
        let entry_level = ru32(self.region.bytes(), IH_ENTRY_LEVEL);

        let mut cur = entry_slot;
        for level in (1..=entry_level).rev() {
            cur = self.greedy_step(query, cur, level);
        }

        let mut seeds = vec![cur];
        seeds.extend(self.hilbert_candidates(query, 8));
        seeds.dedup();

        let ef = ef.max(k);
        let results = self.search_layer(query, &seeds, ef, 0, u64::MAX);
        let mut hits: Vec<(u64, f32)> = results
            .into_iter()
            .filter(|&(s, _)| !self.slot_ids[s as usize].is_zero() && !self.vector(s).is_zero())
            .map(|(s, d)| (s, 1.0 - d))
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    /// Slots whose Hilbert keys neighbor the query's key
    fn hilbert_candidates(&self, query: &QuantizedVector, per_side: usize) -> Vec<u64> {
        let key = hilbert_key(query);
        let mut out = Vec::with_capacity(per_side * 2);
        out.extend(
            self.hilbert
                .range(..(key, u128::MAX))
                .rev()
                .take(per_side)
                .map(|(_, &slot)| slot),
        );
        out.extend(
            self.hilbert
                .range((key, 0)..)
                .take(per_side)
                .map(|(_, &slot)| slot),
        );
        out
    }
}

impl std::fmt::Debug for UnifiedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedIndex")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("slot_capacity", &self.slot_capacity())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
