//! Key-value store trait and related types.
//!
//! This module defines the only storage primitive the reservation engine relies on:
//! a remote key-value store with integer counters, per-key expiry, key enumeration
//! by prefix and atomic scripted transactions.
//!
//! # Design
//!
//! All coordination between concurrent request handlers happens inside the store.
//! Anything that reads and then conditionally writes must go through
//! [`KeyValueStore::eval`] so the store serializes it against every other script
//! touching the same keys. The plain commands exist for single-key reads, blind
//! writes and best-effort bookkeeping.
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] (a pinned boxed future) instead of using
//! `async fn` so the engine can hold an `Arc<dyn KeyValueStore>`.

use crate::script::Script;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected the connection.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the configured network timeout.
    #[error("Store operation `{operation}` timed out after {after:?}")]
    Timeout {
        /// Command or script that timed out.
        operation: &'static str,
        /// Configured bound that elapsed.
        after: Duration,
    },

    /// An atomic script raised an error or received malformed arguments.
    #[error("Script `{script}` failed: {message}")]
    Script {
        /// Script name.
        script: &'static str,
        /// Error reported by the script.
        message: String,
    },

    /// A key holds a value that cannot be interpreted (e.g. a non-integer counter).
    #[error("Invalid value at `{key}`: {value}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Raw value found at the key.
        value: String,
    },
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by every [`KeyValueStore`] method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remaining lifetime of a key.
///
/// Mirrors the three answers of the Redis `TTL` command: `-2` (no such key),
/// `-1` (key exists without expiry) and a non-negative remaining duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (expired or deleted).
    Missing,
    /// The key exists and has no expiry set.
    Persistent,
    /// The key exists and expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Interpret a Redis `TTL` reply (seconds).
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Guarded by the match arm
    pub const fn from_redis_seconds(seconds: i64) -> Self {
        match seconds {
            -1 => Self::Persistent,
            s if s >= 0 => Self::Expires(Duration::from_secs(s as u64)),
            _ => Self::Missing,
        }
    }

    /// Interpret a Redis `PTTL` reply (milliseconds).
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Guarded by the match arm
    pub const fn from_redis_millis(millis: i64) -> Self {
        match millis {
            -1 => Self::Persistent,
            ms if ms >= 0 => Self::Expires(Duration::from_millis(ms as u64)),
            _ => Self::Missing,
        }
    }

    /// Returns `true` if the key exists without an expiry.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent)
    }

    /// Remaining lifetime in whole seconds, if the key expires.
    #[must_use]
    pub const fn remaining_secs(&self) -> Option<u64> {
        match self {
            Self::Expires(d) => Some(d.as_secs()),
            Self::Missing | Self::Persistent => None,
        }
    }
}

/// Parse an integer counter read from the store.
///
/// An absent key reads as `0`, matching Redis `INCRBY` semantics.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] if the value is not an integer.
pub fn parse_counter(key: &str, raw: Option<&str>) -> Result<i64> {
    raw.map_or(Ok(0), |value| {
        value.trim().parse::<i64>().map_err(|_| StoreError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    })
}

/// Key-value store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request handler.
///
/// # Implementations
///
/// - **`RedisStore`** (production): Redis with Lua scripts
/// - **`InMemoryStore`** (testing): `HashMap` behind a single lock
pub trait KeyValueStore: Send + Sync {
    /// Read a key. Returns `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>>;

    /// Read several keys in one round trip (Redis `MGET`).
    ///
    /// The result has the same length and order as `keys`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn get_many(&self, keys: &[String]) -> StoreFuture<'_, Vec<Option<String>>>;

    /// Write a key without expiry. Any previous expiry is cleared.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()>;

    /// Write a key that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreFuture<'_, ()>;

    /// Write a key only if it does not exist. Returns `true` if written.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn set_if_absent(&self, key: &str, value: String) -> StoreFuture<'_, bool>;

    /// Add `delta` (may be negative) to an integer key and return the new value.
    ///
    /// A missing key counts as `0`. An existing expiry is preserved.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an integer or the store is unreachable.
    fn incr_by(&self, key: &str, delta: i64) -> StoreFuture<'_, i64>;

    /// Set an expiry on an existing key. Returns `false` if the key is missing.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn expire(&self, key: &str, ttl: Duration) -> StoreFuture<'_, bool>;

    /// Remaining lifetime of a key.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn ttl(&self, key: &str) -> StoreFuture<'_, KeyTtl>;

    /// Enumerate every key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn keys_with_prefix(&self, prefix: &str) -> StoreFuture<'_, Vec<String>>;

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or times out.
    fn delete(&self, key: &str) -> StoreFuture<'_, bool>;

    /// Run an atomic scripted transaction.
    ///
    /// No other command or script interleaves with the script's reads and
    /// writes. Integer replies come back as their decimal string; a Lua `nil`
    /// (or `false`) reply comes back as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Script`] if the script fails, or a connectivity error.
    fn eval(
        &self,
        script: &'static Script,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> StoreFuture<'_, Option<String>>;
}
