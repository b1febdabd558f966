//! # Chitta Core
//!
//! Persistent semantic memory engine for AI assistants:
//!
//! - **Unified mapped index**: one memory-mapped file holding the id→slot
//!   hash, fixed-width node metadata, quantized vectors, and the ANN
//!   connection arena
//! - **Write-ahead log**: every mutation durable before acknowledgement;
//!   crash recovery replays to the last synced write
//! - **Quantized ANN**: in-house hierarchical small-world search over
//!   signed 8-bit vectors, Hilbert-key pre-candidate pruning
//! - **Hybrid recall**: dense + BM25 with reciprocal-rank fusion, ranked by
//!   soul-aware relevance (similarity, confidence, recency, epsilon)
//! - **Dynamics**: confidence decay, pruning, Hebbian strengthening,
//!   spreading activation, coherence and vitality metrics, attractor
//!   settling
//! - **Tiered payloads**: hot in-memory cache, warm blob, lz4 cold archive
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chitta_core::{Mind, MindConfig, NodeType, RememberOptions, RecallQuery, SearchMode};
//!
//! let mut mind = Mind::open(MindConfig::default(), Some(Box::new(embedder)))?;
//!
//! let id = mind.remember(
//!     "prefer owned types at API boundaries",
//!     NodeType::Wisdom,
//!     RememberOptions::default(),
//! )?;
//!
//! let hits = mind.recall(
//!     RecallQuery::Text("api design".into()),
//!     5,
//!     None,
//!     SearchMode::Hybrid,
//!     &Default::default(),
//! )?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod dynamics;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod index;
pub mod memory;
pub mod mind;
pub mod primitives;
pub mod search;
pub mod storage;
pub mod time;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{ChittaError, Result};

// Primitives
pub use primitives::{hilbert_key, NodeId, QuantizedVector};

// Data model
pub use memory::{
    ActivationHit, Confidence, ConnectResult, Edge, EdgeType, MemoryStats, Node, NodeType,
    RecallFilters, RecallHit, RememberOptions, ResonateResult, SearchMode, TickReport, Triplet,
};

// Engine façade
pub use mind::{
    FeedbackEvent, ForgetOptions, Mind, MindConfig, RecallQuery, DEFAULT_DIMENSIONS,
};

// Storage layer
pub use storage::{
    sibling, upgrade_to_current, TieredStore, UnifiedIndex, WalRecord, WriteAheadLog,
    FORMAT_VERSION,
};

// Graph
pub use graph::{GraphStore, RealmTree, TripletStore, ROOT_REALM};

// Embeddings
pub use embeddings::{cosine_similarity, Embedder, HashEmbedder};

// Search
pub use search::{recency_score, reciprocal_rank_fusion, RelevanceWeights};

// Dynamics
pub use dynamics::{
    coherence, spread, vitality, vitality_status, ActivationConfig, PRUNE_THRESHOLD,
};

// Time
pub use time::{Clock, ManualClock, SystemClock};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version negotiated by clients
pub const PROTOCOL_MAJOR: u32 = 1;
/// Wire protocol minor version
pub const PROTOCOL_MINOR: u32 = 0;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ChittaError, Confidence, Edge, EdgeType, ForgetOptions, Mind, MindConfig, Node,
        NodeId, NodeType, RecallFilters, RecallHit, RecallQuery, RememberOptions, Result,
        SearchMode, TickReport,
    };

    pub use crate::{Embedder, HashEmbedder};
    pub use crate::{Clock, ManualClock};
}
