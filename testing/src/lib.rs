//! # Stockhold Testing
//!
//! Testing utilities for Stockhold.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a TTL-aware [`KeyValueStore`](stockhold_core::KeyValueStore)
//!   that runs atomic scripts under a single lock
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stockhold_testing::{InMemoryStore, ManualClock};
//!
//! #[tokio::test]
//! async fn test_hold_expires() {
//!     let clock = Arc::new(ManualClock::starting_at_test_epoch());
//!     let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
//!
//!     store.set_with_ttl("hold:s1", "{}".into(), Duration::from_secs(600)).await?;
//!     clock.advance(Duration::from_secs(601));
//!     assert_eq!(store.get("hold:s1").await?, None);
//! }
//! ```

use chrono::{DateTime, Utc};
use stockhold_core::environment::Clock;

mod memory_store;

pub use memory_store::InMemoryStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stockhold_testing::mocks::FixedClock;
    /// use stockhold_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Share it (`Arc<ManualClock>`) between an [`InMemoryStore`](crate::InMemoryStore)
    /// and the test to drive key expiry without sleeping.
    ///
    /// ```
    /// use std::time::Duration;
    /// use stockhold_testing::mocks::ManualClock;
    /// use stockhold_core::environment::Clock;
    ///
    /// let clock = ManualClock::starting_at_test_epoch();
    /// let start = clock.now();
    /// clock.advance(Duration::from_secs(90));
    /// assert_eq!((clock.now() - start).num_seconds(), 90);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Create a clock stopped at the same instant as [`test_clock`].
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_clock().now())
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_clock_advances_only_on_demand() {
        let clock = ManualClock::starting_at_test_epoch();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(1500));
        assert_eq!((clock.now() - start).num_milliseconds(), 1500);
    }
}
