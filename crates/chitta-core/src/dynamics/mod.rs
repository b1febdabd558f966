//! Dynamics
//!
//! The subsystem that keeps memory alive between queries: confidence decay
//! and pruning, Hebbian strengthening of co-activated nodes, spreading
//! activation over the edge graph, the coherence and vitality health
//! metrics, and attractor settling of vectors during maintenance.

mod activation;
mod attractor;
mod decay;
mod health;
mod hebbian;

pub use activation::{spread, ActivationConfig, ACTIVATION_FLOOR};
pub use attractor::{settle, SettledSlot, SETTLE_CAP, SETTLE_STEP};
pub use decay::{decay_confidence, decay_pass, DecayOutcome, DecayedSlot, PRUNE_THRESHOLD};
pub use health::{
    coherence, vitality, vitality_status, RECENT_WINDOW_DAYS, STALE_WINDOW_DAYS,
};
pub use hebbian::{hebbian_update, MAX_STRENGTH};
