//! Synchronized Cache Module
//!
//! `AutoTtlCache` puts a `TtlMap` behind a mutex and registers it with the
//! expiry coordinator, so stale entries are swept even if never accessed.
//! The lock is held only for the map call itself.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, Clock, MonotonicClock, SizeFn, TtlMap};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{Expire, ExpiryCoordinator};

/// State shared by every handle to one cache.
struct CacheInner<K, V> {
    map: Mutex<TtlMap<K, V>>,
    /// Keeps the coordinator alive for as long as this cache is.
    coordinator: Arc<ExpiryCoordinator>,
}

impl<K, V> Expire for CacheInner<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
{
    fn expire(&self) -> Result<usize> {
        Ok(self.map.lock().expire())
    }
}

// == Auto TTL Cache ==
/// Thread-safe bounded TTL cache with background expiry.
///
/// Clones share the same storage. The cache is released once the last clone
/// is dropped; the coordinator never keeps it alive.
///
/// ```ignore
/// let cache = AutoTtlCache::new(10, Duration::from_millis(500))?;
/// cache.set("a", 1)?;
/// assert!(cache.contains("a"));
/// ```
pub struct AutoTtlCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
    cache_id: u64,
}

impl<K, V> Clone for AutoTtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cache_id: self.cache_id,
        }
    }
}

// == Builder ==
/// Optional construction parameters for `AutoTtlCache`.
pub struct CacheBuilder<K, V> {
    maxsize: usize,
    ttl: Duration,
    timer: Arc<dyn Clock>,
    sizeof: Option<SizeFn<V>>,
    items: Vec<(K, V)>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    pub fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            maxsize,
            ttl,
            timer: Arc::new(MonotonicClock),
            sizeof: None,
            items: Vec::new(),
        }
    }

    /// Clock used to stamp and expire entries. Defaults to `MonotonicClock`.
    pub fn timer(mut self, timer: Arc<dyn Clock>) -> Self {
        self.timer = timer;
        self
    }

    /// Per-value size function; `maxsize` then bounds the total size.
    pub fn sizeof<F>(mut self, sizeof: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        self.sizeof = Some(Arc::new(sizeof));
        self
    }

    /// Items loaded before the cache is registered for expiry.
    pub fn items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.items.extend(items);
        self
    }

    // == Build ==
    /// Creates the cache and registers it with the expiry coordinator.
    pub fn build(self) -> Result<AutoTtlCache<K, V>> {
        let mut map = TtlMap::new(self.maxsize, self.ttl, self.timer, self.sizeof)?;
        map.extend(self.items)?;

        let coordinator = ExpiryCoordinator::acquire()?;
        let inner = Arc::new(CacheInner {
            map: Mutex::new(map),
            coordinator: Arc::clone(&coordinator),
        });

        let handle: Weak<dyn Expire> = Arc::downgrade(&inner) as Weak<dyn Expire>;
        let cache_id = coordinator.register(handle, self.ttl);
        debug!(
            cache = cache_id,
            coordinator = coordinator.id(),
            maxsize = self.maxsize,
            ttl = ?self.ttl,
            "Created auto-expiring cache"
        );

        Ok(AutoTtlCache { inner, cache_id })
    }
}

impl<K, V> AutoTtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    // == Constructors ==
    /// Creates an empty cache using the monotonic clock.
    ///
    /// Fails with `CacheError::Configuration` if `maxsize` or `ttl` is zero.
    pub fn new(maxsize: usize, ttl: Duration) -> Result<Self> {
        Self::builder(maxsize, ttl).build()
    }

    pub fn builder(maxsize: usize, ttl: Duration) -> CacheBuilder<K, V> {
        CacheBuilder::new(maxsize, ttl)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.maxsize, config.ttl())
    }

    // == Mapping Operations ==
    /// Returns a clone of the live value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner
            .map
            .lock()
            .get(key)
            .cloned()
            .ok_or(CacheError::KeyNotFound)
    }

    /// Like `get`, falling back to `default` for absent or expired keys.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Stores `value` under `key`, evicting least recently used entries if full.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.inner.map.lock().set(key, value)
    }

    pub fn delete<Q>(&self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pop(key).map(drop)
    }

    /// Removes `key` and returns its live value.
    pub fn pop<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .map
            .lock()
            .remove(key)
            .ok_or(CacheError::KeyNotFound)
    }

    pub fn pop_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pop(key).unwrap_or(default)
    }

    /// Returns the live value for `key`, inserting `default` first if needed.
    pub fn setdefault(&self, key: K, default: V) -> Result<V>
    where
        V: Clone,
    {
        self.inner.map.lock().setdefault(key, default)
    }

    /// Removes and returns the least recently used live entry.
    pub fn pop_item(&self) -> Result<(K, V)> {
        self.inner
            .map
            .lock()
            .pop_item()
            .ok_or(CacheError::KeyNotFound)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.map.lock().contains(key)
    }

    /// Number of stored entries, counting expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.lock().is_empty()
    }

    // == Keys ==
    /// Iterates a snapshot of the live keys taken under the lock.
    ///
    /// The lock is released before the first item is yielded.
    pub fn keys(&self) -> impl Iterator<Item = K> {
        let snapshot = self.inner.map.lock().keys();
        snapshot.into_iter()
    }

    pub fn clear(&self) {
        self.inner.map.lock().clear();
    }

    // == Expire ==
    /// Sweeps expired entries now, returning how many were removed.
    ///
    /// Safe to call while the coordinator is sweeping the same cache.
    pub fn expire(&self) -> usize {
        self.inner.map.lock().expire()
    }

    // == Introspection ==
    pub fn ttl(&self) -> Duration {
        self.inner.map.lock().ttl()
    }

    pub fn maxsize(&self) -> usize {
        self.inner.map.lock().maxsize()
    }

    pub fn currsize(&self) -> usize {
        self.inner.map.lock().currsize()
    }

    pub fn timer(&self) -> Arc<dyn Clock> {
        self.inner.map.lock().timer()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.map.lock().stats()
    }

    /// The coordinator sweeping this cache.
    pub fn coordinator(&self) -> &ExpiryCoordinator {
        &self.inner.coordinator
    }
}

impl<K, V> fmt::Debug for AutoTtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (maxsize, ttl, len) = {
            let map = self.inner.map.lock();
            (map.maxsize(), map.ttl(), map.len())
        };
        f.debug_struct("AutoTtlCache")
            .field("maxsize", &maxsize)
            .field("ttl", &ttl)
            .field("len", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    fn manual_cache(maxsize: usize) -> (AutoTtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = AutoTtlCache::builder(maxsize, TTL)
            .timer(clock.clone())
            .build()
            .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_new_rejects_zero_parameters() {
        let result = AutoTtlCache::<String, u32>::new(0, TTL);
        assert!(matches!(result, Err(CacheError::Configuration(_))));

        let result = AutoTtlCache::<String, u32>::new(10, Duration::ZERO);
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            maxsize: 5,
            ttl_ms: 1500,
        };
        let cache = AutoTtlCache::<String, u32>::from_config(&config).unwrap();
        assert_eq!(cache.maxsize(), 5);
        assert_eq!(cache.ttl(), Duration::from_millis(1500));
    }

    #[test]
    fn test_mapping_surface() {
        let (cache, _) = manual_cache(10);

        cache.set("a".to_string(), 1).unwrap();
        cache.set("b".to_string(), 2).unwrap();

        assert_eq!(cache.get("a").unwrap(), 1);
        assert!(matches!(cache.get("zzz"), Err(CacheError::KeyNotFound)));
        assert_eq!(cache.get_or("zzz", 9), 9);
        assert!(cache.contains("b"));
        assert_eq!(cache.len(), 2);

        cache.delete("a").unwrap();
        assert!(matches!(cache.delete("a"), Err(CacheError::KeyNotFound)));
        assert_eq!(cache.pop("b").unwrap(), 2);
        assert_eq!(cache.pop_or("b", 0), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_setdefault_and_pop_item() {
        let (cache, _) = manual_cache(10);

        assert_eq!(cache.setdefault("x".to_string(), 1).unwrap(), 1);
        assert_eq!(cache.setdefault("x".to_string(), 2).unwrap(), 1);
        cache.set("y".to_string(), 3).unwrap();

        assert_eq!(cache.pop_item().unwrap(), ("x".to_string(), 1));
        assert_eq!(cache.pop_item().unwrap(), ("y".to_string(), 3));
        assert!(matches!(cache.pop_item(), Err(CacheError::KeyNotFound)));
    }

    #[test]
    fn test_items_are_loaded_on_build() {
        let cache: AutoTtlCache<&'static str, u32> =
            AutoTtlCache::builder(10, TTL).items([("a", 1), ("b", 2)]).build().unwrap();

        let mut keys: Vec<_> = cache.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_expired_entries_hidden_until_swept() {
        let (cache, clock) = manual_cache(10);

        cache.set("a".to_string(), 1).unwrap();
        clock.advance(TTL);

        assert!(!cache.contains("a"));
        assert_eq!(cache.keys().count(), 0);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.expire(), 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.expire(), 0);
    }

    #[test]
    fn test_keys_snapshot_does_not_hold_lock() {
        let (cache, _) = manual_cache(10);
        for i in 0..3 {
            cache.set(format!("k{i}"), i).unwrap();
        }

        // Mutating while iterating would deadlock if the lock were held.
        for key in cache.keys() {
            cache.delete(&key).unwrap();
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sizeof_bounds_total() {
        let cache: AutoTtlCache<u32, Vec<u8>> = AutoTtlCache::builder(8, TTL)
            .sizeof(|value: &Vec<u8>| value.len())
            .build()
            .unwrap();

        cache.set(1, vec![0; 5]).unwrap();
        cache.set(2, vec![0; 3]).unwrap();
        assert_eq!(cache.currsize(), 8);

        assert!(matches!(
            cache.set(3, vec![0; 9]),
            Err(CacheError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_clones_share_storage() {
        let (cache, _) = manual_cache(10);
        let other = cache.clone();

        other.set("shared".to_string(), 7).unwrap();
        assert_eq!(cache.get("shared").unwrap(), 7);
        assert_eq!(cache.coordinator().id(), other.coordinator().id());
    }

    #[test]
    fn test_concurrent_writers_see_own_writes() {
        let cache: AutoTtlCache<String, usize> = AutoTtlCache::new(1000, TTL).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        cache.set(key.clone(), i).unwrap();
                        assert_eq!(cache.get(&key).unwrap(), i);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }

    #[test]
    fn test_debug_rendering() {
        let (cache, _) = manual_cache(10);
        cache.set("a".to_string(), 1).unwrap();

        let rendered = format!("{cache:?}");
        assert_eq!(rendered, "AutoTtlCache { maxsize: 10, ttl: 60s, len: 1 }");
    }

    #[test]
    fn test_unbounded_ttl_does_not_overflow() {
        let cache = AutoTtlCache::<u8, u8>::new(10, Duration::MAX).unwrap();

        cache.set(1, 1).unwrap();
        assert!(cache.contains(&1));
        assert_eq!(cache.get(&1).unwrap(), 1);
        assert_eq!(cache.expire(), 0);
        assert!(cache.coordinator().is_running());
    }
}
