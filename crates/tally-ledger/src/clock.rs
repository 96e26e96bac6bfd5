//! Time sources.
//!
//! Every ledger operation takes `now` explicitly; these clocks are what the
//! service layer reads it from. Neither clock ever goes backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::Timestamp;

/// Monotonic source of Unix timestamps in seconds.
pub trait Clock: Send + Sync {
    /// Current timestamp. Never lower than a previously returned value.
    fn now(&self) -> Timestamp;
}

/// Wall clock clamped so it never regresses within the process.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let previous = self.high_water.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock to `to`. Earlier values are ignored.
    pub fn set(&self, to: Timestamp) {
        self.now.fetch_max(to, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(secs))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
