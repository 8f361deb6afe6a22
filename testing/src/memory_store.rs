//! In-memory key-value store for tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stockhold_core::environment::{Clock, SystemClock};
use stockhold_core::script::{Script, ScriptContext};
use stockhold_core::store::{KeyTtl, KeyValueStore, Result, StoreError, StoreFuture, parse_counter};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory [`KeyValueStore`] with Redis-like expiry semantics.
///
/// All state sits behind one mutex. Scripts run their Rust body while the lock
/// is held, so they are atomic with respect to every other operation, like Lua
/// scripts in Redis.
///
/// Expiry is driven by the injected [`Clock`]: expired keys are purged at the
/// start of every operation. Pair it with a
/// [`ManualClock`](crate::mocks::ManualClock) to expire holds on demand.
///
/// # Example
///
/// ```
/// use stockhold_core::KeyValueStore;
/// use stockhold_testing::InMemoryStore;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// assert_eq!(store.incr_by("stock:mug", 3).await, Ok(3));
/// assert_eq!(store.get("stock:mug").await, Ok(Some("3".to_string())));
/// # });
/// ```
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: while offline every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::debug!(offline, "In-memory store availability changed");
    }

    /// Strip the expiry from a key, as a crashed writer would leave it.
    ///
    /// Returns `false` if the key does not exist.
    pub fn persist(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get_mut(key).is_some_and(|entry| {
            entry.expires_at = None;
            true
        })
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Returns `true` if no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_state<T>(&self, op: impl FnOnce(&mut LockedState<'_>) -> Result<T>) -> Result<T> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));

        let mut state = LockedState {
            entries: &mut *entries,
            now,
        };
        op(&mut state)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// The store as seen while its lock is held.
struct LockedState<'a> {
    entries: &'a mut HashMap<String, Entry>,
    now: DateTime<Utc>,
}

impl LockedState<'_> {
    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        let delta = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX);
        self.now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl ScriptContext for LockedState<'_> {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    fn set_with_ttl(&mut self, key: &str, value: String, ttl: Duration) {
        let expires_at = Some(self.deadline(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        let current = parse_counter(key, self.entries.get(key).map(|e| e.value.as_str()))?;
        let next = current.checked_add(delta).ok_or_else(|| StoreError::InvalidValue {
            key: key.to_string(),
            value: format!("{current} + {delta} overflows"),
        })?;

        match self.entries.get_mut(key) {
            Some(entry) => entry.value = next.to_string(),
            None => self.set(key, next.to_string()),
        }
        Ok(next)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        let deadline = self.deadline(ttl);
        self.entries.get_mut(key).is_some_and(|entry| {
            entry.expires_at = Some(deadline);
            true
        })
    }

    fn ttl(&self, key: &str) -> KeyTtl {
        match self.entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires((*at - self.now).to_std().unwrap_or(Duration::ZERO)),
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move { self.with_state(|state| Ok(state.get(&key))) })
    }

    fn get_many(&self, keys: &[String]) -> StoreFuture<'_, Vec<Option<String>>> {
        let keys = keys.to_vec();
        Box::pin(async move {
            self.with_state(|state| Ok(keys.iter().map(|key| state.get(key)).collect()))
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.with_state(|state| {
                state.set(&key, value);
                Ok(())
            })
        })
    }

    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.with_state(|state| {
                state.set_with_ttl(&key, value, ttl);
                Ok(())
            })
        })
    }

    fn set_if_absent(&self, key: &str, value: String) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            self.with_state(|state| {
                if state.entries.contains_key(&key) {
                    return Ok(false);
                }
                state.set(&key, value);
                Ok(true)
            })
        })
    }

    fn incr_by(&self, key: &str, delta: i64) -> StoreFuture<'_, i64> {
        let key = key.to_string();
        Box::pin(async move { self.with_state(|state| state.incr_by(&key, delta)) })
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move { self.with_state(|state| Ok(state.expire(&key, ttl))) })
    }

    fn ttl(&self, key: &str) -> StoreFuture<'_, KeyTtl> {
        let key = key.to_string();
        Box::pin(async move { self.with_state(|state| Ok(state.ttl(&key))) })
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreFuture<'_, Vec<String>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            self.with_state(|state| {
                let mut keys: Vec<String> = state
                    .entries
                    .keys()
                    .filter(|key| key.starts_with(&prefix))
                    .cloned()
                    .collect();
                keys.sort();
                Ok(keys)
            })
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move { self.with_state(|state| Ok(state.delete(&key))) })
    }

    fn eval(
        &self,
        script: &'static Script,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move { self.with_state(|state| script.run_local(state, &keys, &args)) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::ManualClock;
    use stockhold_core::script::ScriptArgs;

    fn store_with_clock() -> (InMemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at_test_epoch());
        (InMemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_keys_expire_with_clock() {
        let (store, clock) = store_with_clock();
        store
            .set_with_ttl("hold:s1", "x".to_string(), Duration::from_secs(10))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9));
        assert_eq!(
            store.ttl("hold:s1").await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(1))
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("hold:s1").await.unwrap(), None);
        assert_eq!(store.ttl("hold:s1").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_incr_preserves_ttl_and_set_clears_it() {
        let (store, _clock) = store_with_clock();
        store.incr_by("reserved:a", 2).await.unwrap();
        store.expire("reserved:a", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.incr_by("reserved:a", -1).await.unwrap(), 1);
        assert!(matches!(store.ttl("reserved:a").await.unwrap(), KeyTtl::Expires(_)));

        store.set("reserved:a", "5".to_string()).await.unwrap();
        assert_eq!(store.ttl("reserved:a").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn test_incr_on_text_value_is_rejected() {
        let store = InMemoryStore::new();
        store.set("stock:a", "many".to_string()).await.unwrap();

        let result = store.incr_by("stock:a", 1).await;
        assert!(matches!(result, Err(StoreError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_persist_strips_expiry() {
        let (store, clock) = store_with_clock();
        store
            .set_with_ttl("hold:s1", "x".to_string(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(store.persist("hold:s1"));
        clock.advance(Duration::from_secs(60));
        assert_eq!(store.ttl("hold:s1").await.unwrap(), KeyTtl::Persistent);
        assert!(!store.persist("hold:missing"));
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_operation() {
        let store = InMemoryStore::new();
        store.set_offline(true);

        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.incr_by("k", 1).await, Err(StoreError::Unavailable(_))));

        store.set_offline(false);
        assert_eq!(store.get("k").await, Ok(None));
    }

    #[tokio::test]
    async fn test_keys_with_prefix_and_get_many() {
        let store = InMemoryStore::new();
        store.set("stock:b", "2".to_string()).await.unwrap();
        store.set("stock:a", "1".to_string()).await.unwrap();
        store.set("reserved:a", "1".to_string()).await.unwrap();

        let keys = store.keys_with_prefix("stock:").await.unwrap();
        assert_eq!(keys, vec!["stock:a".to_string(), "stock:b".to_string()]);

        let values = store
            .get_many(&["stock:a".to_string(), "stock:zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None]);
        assert!(store.set_if_absent("stock:c", "0".to_string()).await.unwrap());
        assert!(!store.set_if_absent("stock:c", "9".to_string()).await.unwrap());
    }

    fn swap(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
        let key = args.key(0)?;
        let previous = ctx.get(key);
        ctx.set(key, args.arg(0)?.to_string());
        Ok(previous)
    }

    static SWAP: Script = Script::new(
        "swap",
        "local p = redis.call('GET', KEYS[1]); redis.call('SET', KEYS[1], ARGV[1]); return p",
        swap,
    );

    #[tokio::test]
    async fn test_eval_runs_script_body() {
        let store = InMemoryStore::new();
        let keys = vec!["stock:a".to_string()];

        let first = store.eval(&SWAP, keys.clone(), vec!["4".to_string()]).await;
        let second = store.eval(&SWAP, keys, vec!["7".to_string()]).await;

        assert_eq!(first, Ok(None));
        assert_eq!(second, Ok(Some("4".to_string())));
    }
}
