//! Engine clock
//!
//! All timestamps inside the engine are milliseconds since the Unix epoch,
//! read through an injectable [`Clock`] so decay and pruning can be driven
//! by simulated time in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day
pub const MS_PER_DAY: i64 = 86_400_000;

/// Source of engine time
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Wall clock with an adjustable offset, for driving decay in tests
#[derive(Debug, Default)]
pub struct ManualClock {
    offset_ms: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Advance simulated time by whole days
    pub fn advance_days(&self, days: i64) {
        self.offset_ms.fetch_add(days * MS_PER_DAY, Ordering::SeqCst);
    }

    /// Advance simulated time by milliseconds
    pub fn advance_ms(&self, ms: i64) {
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        SystemClock.now_ms() + self.offset_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let before = clock.now_ms();
        clock.advance_days(90);
        let after = clock.now_ms();
        assert!(after - before >= 90 * MS_PER_DAY);
    }
}
