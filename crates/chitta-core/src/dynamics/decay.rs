//! Confidence decay and pruning
//!
//! On every maintenance tick, each node with a positive decay rate has its
//! confidence mean contracted toward 0.5 and its variance raised toward the
//! 0.25 cap, both as functions of days since last access. Protected types
//! (invariants, beliefs) are exempt. Nodes whose effective confidence falls
//! under the prune threshold are removed, protected types never.

use crate::memory::{Confidence, VARIANCE_CAP};
use crate::primitives::NodeId;
use crate::storage::UnifiedIndex;
use crate::time::MS_PER_DAY;

/// Default prune threshold on effective confidence
pub const PRUNE_THRESHOLD: f32 = 0.1;

/// One slot's decayed confidence, computed but not yet applied
#[derive(Debug, Clone)]
pub struct DecayedSlot {
    pub slot: u64,
    pub id: NodeId,
    pub confidence: Confidence,
}

/// Outcome of a decay pass; the caller applies and WAL-logs it
#[derive(Debug, Default)]
pub struct DecayOutcome {
    pub decayed: Vec<DecayedSlot>,
    /// Nodes falling under the prune threshold, protected types excluded
    pub prune: Vec<NodeId>,
}

/// Contract one confidence toward 0.5 by `days` of elapsed decay
pub fn decay_confidence(confidence: &Confidence, decay_rate: f32, days: f32, now_ms: i64) -> Confidence {
    let factor = (-decay_rate * days).exp();
    Confidence {
        mu: 0.5 + (confidence.mu - 0.5) * factor,
        variance: (confidence.variance + 0.01 * (1.0 - factor)).min(VARIANCE_CAP),
        observations: confidence.observations,
        updated_at: (now_ms / 1000) as u32,
    }
}

/// Compute decay over every eligible slot
pub fn decay_pass(index: &UnifiedIndex, now_ms: i64, prune_threshold: f32) -> DecayOutcome {
    let mut outcome = DecayOutcome::default();
    for slot in index.live_slots() {
        let meta = index.meta(slot);
        if meta.node_type.is_protected() || meta.decay_rate <= 0.0 {
            continue;
        }
        let days = ((now_ms - meta.accessed_at).max(0) as f32) / MS_PER_DAY as f32;
        if days <= 0.0 {
            continue;
        }
        let confidence = decay_confidence(&meta.confidence, meta.decay_rate, days, now_ms);
        let id = index.id_at(slot);
        if confidence.effective() < prune_threshold {
            outcome.prune.push(id);
        }
        outcome.decayed.push(DecayedSlot { slot, id, confidence });
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_contracts_toward_half() {
        let c = Confidence { mu: 0.9, variance: 0.05, observations: 3, updated_at: 0 };
        let decayed = decay_confidence(&c, 0.05, 90.0, 0);
        assert!(decayed.mu < c.mu);
        assert!(decayed.mu > 0.5);

        let low = Confidence { mu: 0.1, variance: 0.05, observations: 3, updated_at: 0 };
        let decayed_low = decay_confidence(&low, 0.05, 90.0, 0);
        assert!(decayed_low.mu > low.mu);
        assert!(decayed_low.mu < 0.5);
    }

    #[test]
    fn test_variance_monotone_and_capped() {
        let mut c = Confidence { mu: 0.9, variance: 0.05, observations: 1, updated_at: 0 };
        let mut last = c.variance;
        for _ in 0..40 {
            c = decay_confidence(&c, 0.05, 365.0, 0);
            assert!(c.variance >= last);
            assert!(c.variance <= VARIANCE_CAP);
            last = c.variance;
        }
        assert!((c.variance - VARIANCE_CAP).abs() < 1e-6);
        // at the cap the effective confidence bottoms out at zero
        assert_eq!(c.effective(), 0.0);
    }

    #[test]
    fn test_zero_days_is_identity_on_mu() {
        let c = Confidence { mu: 0.8, variance: 0.1, observations: 1, updated_at: 0 };
        let decayed = decay_confidence(&c, 0.05, 0.0, 0);
        assert!((decayed.mu - 0.8).abs() < 1e-6);
        assert!((decayed.variance - 0.1).abs() < 1e-6);
    }
}
