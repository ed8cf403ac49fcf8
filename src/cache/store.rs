//! Cache Store Module
//!
//! Bounded map combining HashMap storage with LRU tracking and TTL expiration.
//! Not synchronized; `AutoTtlCache` puts it behind a lock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheEntry, CacheStats, Clock, LruTracker};
use crate::config;
use crate::error::{CacheError, Result};

/// Computes the size of a value in the map's size units.
pub type SizeFn<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

// == TTL Map ==
/// Size-bounded map whose entries all share one time-to-live.
pub struct TtlMap<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum total size of all entries
    maxsize: usize,
    /// Current total size of all entries
    currsize: usize,
    /// Lifetime of every entry
    ttl: Duration,
    /// Time source for stamping and expiring entries
    timer: Arc<dyn Clock>,
    /// Per-value size function; every value counts as 1 without one
    sizeof: Option<SizeFn<V>>,
}

impl<K, V> TtlMap<K, V> {
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn currsize(&self) -> usize {
        self.currsize
    }

    pub fn timer(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.timer)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.currsize = self.currsize;
        stats
    }

    // == Length ==
    /// Returns the number of stored entries, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> TtlMap<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates an empty map.
    ///
    /// Fails with `CacheError::Configuration` if `maxsize` or `ttl` is zero.
    pub fn new(
        maxsize: usize,
        ttl: Duration,
        timer: Arc<dyn Clock>,
        sizeof: Option<SizeFn<V>>,
    ) -> Result<Self> {
        config::validate(maxsize, ttl)?;
        Ok(Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            maxsize,
            currsize: 0,
            ttl,
            timer,
            sizeof,
        })
    }

    fn size_of(&self, value: &V) -> usize {
        self.sizeof.as_ref().map_or(1, |sizeof| sizeof(value))
    }

    // == Set ==
    /// Stores a key-value pair, resetting the key's expiry.
    ///
    /// Expired entries are swept first; least recently used entries are then
    /// evicted until the new value fits.
    pub fn set(&mut self, key: K, value: V) -> Result<()> {
        let now = self.timer.now();
        self.expire_at(now);

        let size = self.size_of(&value);
        if size > self.maxsize {
            return Err(CacheError::CapacityExceeded(format!(
                "value of size {} exceeds maxsize {}",
                size, self.maxsize
            )));
        }

        if let Some(old) = self.entries.remove(&key) {
            self.currsize -= old.size;
            self.lru.remove(&key);
        }

        while self.currsize + size > self.maxsize {
            let Some(evicted_key) = self.lru.evict_oldest() else {
                return Err(CacheError::CapacityExceeded(
                    "cache is full and eviction failed".to_string(),
                ));
            };
            if let Some(evicted) = self.entries.remove(&evicted_key) {
                self.currsize -= evicted.size;
                self.stats.record_eviction();
            }
        }

        self.entries
            .insert(key.clone(), CacheEntry::new(value, size, now, self.ttl));
        self.currsize += size;
        self.lru.touch(key);

        Ok(())
    }

    // == Extend ==
    /// Bulk-loads items in order; stops at the first failure.
    pub fn extend<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in items {
            self.set(key, value)?;
        }
        Ok(())
    }

    // == Get ==
    /// Retrieves a live value, marking it as recently used.
    ///
    /// Expired entries count as misses but stay stored until the next sweep.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.timer.now();
        let live = matches!(self.entries.get(key), Some(entry) if !entry.is_expired(now));
        if !live {
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch_existing(key);
        self.entries.get(key).map(|entry| &entry.value)
    }

    // == Contains ==
    /// Returns true if the key holds a live entry. Does not affect LRU order.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.timer.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Remove ==
    /// Removes an entry, returning its value if it was still live.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.timer.now();
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.currsize -= entry.size;
        (!entry.is_expired(now)).then_some(entry.value)
    }

    // == Set Default ==
    /// Returns the live value for `key`, inserting `default` if there is none.
    pub fn setdefault(&mut self, key: K, default: V) -> Result<V>
    where
        V: Clone,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value.clone());
        }
        self.set(key, default.clone())?;
        Ok(default)
    }

    // == Pop Item ==
    /// Removes and returns the least recently used live entry.
    pub fn pop_item(&mut self) -> Option<(K, V)> {
        self.expire();
        while let Some(key) = self.lru.evict_oldest() {
            if let Some(entry) = self.entries.remove(&key) {
                self.currsize -= entry.size;
                return Some((key, entry.value));
            }
        }
        None
    }

    // == Keys ==
    /// Returns the keys of all live entries, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        let now = self.timer.now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.currsize = 0;
    }

    // == Expire ==
    /// Removes all expired entries, returning the number removed.
    pub fn expire(&mut self) -> usize {
        let now = self.timer.now();
        self.expire_at(now)
    }

    fn expire_at(&mut self, now: Instant) -> usize {
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            if let Some(entry) = self.entries.remove(&key) {
                self.currsize -= entry.size;
            }
            self.lru.remove(&key);
        }

        self.stats.record_expirations(count);
        count
    }

}

impl<K, V> fmt::Debug for TtlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlMap")
            .field("maxsize", &self.maxsize)
            .field("currsize", &self.currsize)
            .field("ttl", &self.ttl)
            .field("len", &self.entries.len())
            .finish()
    }
}
