//! Sticky connection-failure latch.
//!
//! Unlike a circuit breaker there is no automatic recovery: once tripped the
//! latch stays set until [`ConnectionLatch::reset`] is called, normally right
//! after the caller has reconnected.

use crate::error::CrescoError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct ConnectionLatch {
    tripped: AtomicBool,
    /// Lifetime number of false-to-true transitions.
    trips: AtomicU64,
}

impl ConnectionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns true if this call tripped it.
    pub fn trip(&self, cause: &CrescoError) -> bool {
        let first = self
            .tripped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.trips.fetch_add(1, Ordering::SeqCst);
            error!("Connection marked as failed: {}", cause);
        }
        first
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        if self.tripped.swap(false, Ordering::SeqCst) {
            info!("Connection failure latch cleared");
        }
    }

    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_is_sticky() {
        let latch = ConnectionLatch::new();
        assert!(!latch.is_tripped());

        assert!(latch.trip(&CrescoError::NotConnected));
        assert!(!latch.trip(&CrescoError::NotConnected));
        assert!(latch.is_tripped());
        assert_eq!(latch.trip_count(), 1);
    }

    #[test]
    fn test_reset_clears() {
        let latch = ConnectionLatch::new();
        latch.trip(&CrescoError::connection("reset by peer"));
        latch.reset();
        assert!(!latch.is_tripped());

        latch.trip(&CrescoError::connection("reset by peer"));
        assert_eq!(latch.trip_count(), 2);
    }
}
