//! # Stockhold Redis
//!
//! Production [`KeyValueStore`] backed by Redis.
//!
//! # Architecture
//!
//! - One [`ConnectionManager`] shared by every caller (it reconnects on its own)
//! - Every command is bounded by `command_timeout`; an elapsed bound becomes
//!   [`StoreError::Timeout`]
//! - Atomic transactions run as Lua via `EVALSHA` (falling back to `EVAL` on a
//!   script cache miss)
//!
//! # Example
//!
//! ```no_run
//! use stockhold_redis::{RedisStore, RedisStoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::connect(&RedisStoreConfig::new("redis://127.0.0.1:6379")).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use std::future::Future;
use std::time::Duration;
use stockhold_core::script::Script;
use stockhold_core::store::{KeyTtl, KeyValueStore, Result, StoreError, StoreFuture};

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,
    /// Bound on establishing the initial connection.
    pub connect_timeout: Duration,
    /// Bound on every command and script.
    pub command_timeout: Duration,
}

impl RedisStoreConfig {
    /// Settings for `url` with default timeouts (5 s connect, 2 s per command).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// `Redis`-backed key-value store.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is invalid or the server
    /// cannot be reached, and [`StoreError::Timeout`] if connecting takes longer
    /// than `connect_timeout`.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "connect",
                after: config.connect_timeout,
            })?
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
            })?;

        tracing::info!(
            command_timeout_ms = config.command_timeout.as_millis(),
            "Connected to Redis"
        );

        Ok(Self {
            conn_manager,
            command_timeout: config.command_timeout,
        })
    }

    /// Await a command under the configured timeout, mapping failures with `on_error`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        command: impl Future<Output = RedisResult<T>>,
        on_error: impl FnOnce(RedisError) -> StoreError,
    ) -> Result<T> {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(operation, error = %e, "Redis command failed");
                Err(on_error(e))
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.command_timeout.as_millis(),
                    "Redis command timed out"
                );
                Err(StoreError::Timeout {
                    operation,
                    after: self.command_timeout,
                })
            }
        }
    }
}

fn unavailable(operation: &'static str) -> impl FnOnce(RedisError) -> StoreError {
    move |e| StoreError::Unavailable(format!("{operation} failed: {e}"))
}

fn is_connectivity_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// Escape glob metacharacters so a prefix matches literally in `KEYS`.
fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

fn millis_u64(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

fn millis_i64(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            self.bounded("GET", conn.get(&key), unavailable("GET")).await
        })
    }

    fn get_many(&self, keys: &[String]) -> StoreFuture<'_, Vec<Option<String>>> {
        let keys = keys.to_vec();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.conn_manager.clone();
            self.bounded("MGET", conn.mget(&keys), unavailable("MGET"))
                .await
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            self.bounded("SET", conn.set(&key, value), unavailable("SET"))
                .await
        })
    }

    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            self.bounded(
                "PSETEX",
                conn.pset_ex(&key, value, millis_u64(ttl)),
                unavailable("PSETEX"),
            )
            .await
        })
    }

    fn set_if_absent(&self, key: &str, value: String) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            self.bounded("SETNX", conn.set_nx(&key, value), unavailable("SETNX"))
                .await
        })
    }

    fn incr_by(&self, key: &str, delta: i64) -> StoreFuture<'_, i64> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let error_key = key.clone();
            self.bounded("INCRBY", conn.incr(&key, delta), move |e| {
                if is_connectivity_error(&e) {
                    StoreError::Unavailable(format!("INCRBY failed: {e}"))
                } else {
                    StoreError::InvalidValue {
                        key: error_key,
                        value: e.to_string(),
                    }
                }
            })
            .await
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            self.bounded(
                "PEXPIRE",
                conn.pexpire(&key, millis_i64(ttl)),
                unavailable("PEXPIRE"),
            )
            .await
        })
    }

    fn ttl(&self, key: &str) -> StoreFuture<'_, KeyTtl> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let millis: i64 = self
                .bounded("PTTL", conn.pttl(&key), unavailable("PTTL"))
                .await?;
            Ok(KeyTtl::from_redis_millis(millis))
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreFuture<'_, Vec<String>> {
        let pattern = glob_prefix(prefix);
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let mut keys: Vec<String> = self
                .bounded("KEYS", conn.keys(&pattern), unavailable("KEYS"))
                .await?;
            keys.sort();
            Ok(keys)
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: i64 = self
                .bounded("DEL", conn.del(&key), unavailable("DEL"))
                .await?;
            Ok(removed > 0)
        })
    }

    fn eval(
        &self,
        script: &'static Script,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let lua = redis::Script::new(script.lua());
            let mut invocation = lua.prepare_invoke();
            for key in &keys {
                invocation.key(key);
            }
            for arg in &args {
                invocation.arg(arg);
            }

            let name = script.name();
            self.bounded("EVALSHA", invocation.invoke_async(&mut conn), move |e| {
                if is_connectivity_error(&e) {
                    StoreError::Unavailable(format!("script `{name}` failed: {e}"))
                } else {
                    StoreError::Script {
                        script: name,
                        message: e.to_string(),
                    }
                }
            })
            .await
        })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
