//! # Stockhold Core
//!
//! Core traits and types shared by every Stockhold crate.
//!
//! This crate owns the seam between the reservation engine and whatever
//! key-value store backs it:
//!
//! - [`store::KeyValueStore`]: the store adapter trait (get/set/incr, TTLs,
//!   prefix enumeration, atomic scripts)
//! - [`script::Script`]: an atomic transaction expressed twice, as Lua for
//!   Redis and as a Rust body for in-process stores
//! - [`environment::Clock`]: injected time source
//!
//! ## Implementations
//!
//! - `RedisStore` (in `stockhold-redis`): production
//! - `InMemoryStore` (in `stockhold-testing`): fast, deterministic tests
//!
//! ## Example
//!
//! ```ignore
//! use stockhold_core::store::KeyValueStore;
//!
//! async fn bump(store: &dyn KeyValueStore) -> stockhold_core::store::Result<i64> {
//!     store.incr_by("stock:espresso", 5).await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod script;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use script::{Script, ScriptArgs, ScriptContext};
pub use store::{KeyTtl, KeyValueStore, StoreError, StoreFuture};

/// Environment module - injected dependencies that are not the store.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use stockhold_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
