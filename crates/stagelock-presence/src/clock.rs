//! Clock adapter for production vs test time sources.
//!
//! The coordinator evaluates every TTL lazily against [`Clock::now`], so
//! swapping the time source is all a test needs to exercise expiry:
//! - **Production**: [`SystemClock`] reads wall-clock time
//! - **Tests and replays**: [`ManualClock`] only moves when told to
//!
//! Use `C: Clock` generic parameters, not `&dyn Clock`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stagelock_presence::{Clock, ManualClock};
//!
//! let clock = Arc::new(ManualClock::starting_at_millis(1_000));
//! let handle = Arc::clone(&clock);
//!
//! clock.advance_millis(500);
//! assert_eq!(handle.now().as_millis(), 1_500);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use stagelock_types::Timestamp;

/// Source of "now" for TTL evaluation.
///
/// Implementations must be `Send + Sync` so a coordinator can sit behind a
/// shared handle.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ============================================================================
// Manual Implementation
// ============================================================================

/// Deterministic clock that advances only when explicitly requested.
///
/// Interior mutability lets a test keep an `Arc<ManualClock>` while the
/// coordinator owns another handle to the same clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock at the Unix epoch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at_millis(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Moves the clock forward by `delta_ms`, saturating at `u64::MAX`.
    pub fn advance_millis(&self, delta_ms: u64) {
        // fetch_update with a closure that always returns Some cannot fail
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta_ms))
            });
    }

    /// Sets the clock to an absolute instant.
    ///
    /// Moving backwards is allowed; the coordinator treats a backwards jump
    /// as "nothing has expired yet".
    pub fn set(&self, now: Timestamp) {
        self.now_ms.store(now.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_epoch() {
        assert_eq!(ManualClock::new().now(), Timestamp::EPOCH);
    }

    #[test]
    fn manual_clock_advances_and_saturates() {
        let clock = ManualClock::starting_at_millis(10);
        clock.advance_millis(5);
        assert_eq!(clock.now(), Timestamp::from_millis(15));

        clock.set(Timestamp::from_millis(u64::MAX - 1));
        clock.advance_millis(10);
        assert_eq!(clock.now(), Timestamp::from_millis(u64::MAX));
    }

    #[test]
    fn shared_manual_clock_is_observed_through_arc() {
        let clock = Arc::new(ManualClock::new());
        let observer: Arc<ManualClock> = Arc::clone(&clock);

        clock.set(Timestamp::from_millis(42));
        assert_eq!(observer.now(), Timestamp::from_millis(42));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > Timestamp::EPOCH);
    }
}
