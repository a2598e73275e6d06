//! Clock seam and consumption bucket arithmetic.
//!
//! Services never sample the system clock directly; they hold a [`Clock`]
//! trait object so tests can drive TTL expiry and bucket placement
//! deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually driven clock for tests.
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(ms),
        }
    }

    /// Move the clock forward by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Start of the fixed-width bucket containing `timestamp_ms`.
///
/// Bucket boundaries are aligned to multiples of `bucket_width_ms`, so every
/// node places a timestamp into the same bucket regardless of when it boots.
pub fn bucket_start(timestamp_ms: u64, bucket_width_ms: u64) -> u64 {
    debug_assert!(bucket_width_ms > 0);
    timestamp_ms / bucket_width_ms * bucket_width_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_start_aligns_to_width() {
        assert_eq!(bucket_start(0, 60_000), 0);
        assert_eq!(bucket_start(59_999, 60_000), 0);
        assert_eq!(bucket_start(60_000, 60_000), 60_000);
        assert_eq!(bucket_start(125_000, 60_000), 120_000);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
