//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Size of the value in the map's size units
    pub size: usize,
    /// Instant the entry was written, per the map's clock
    pub created_at: Instant,
    /// Instant at which the entry becomes expired; None when the deadline is
    /// past what `Instant` can represent, in which case it never expires
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry written at `now` that lives for `ttl`.
    pub fn new(value: V, size: usize, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            size,
            created_at: now,
            expires_at: now.checked_add(ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry is expired when `now` is greater than or
    /// equal to the expiration instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    // == Time To Live ==
    /// Returns remaining lifetime as of `now`; zero once expired, None if the
    /// entry never expires.
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(now))
    }
}
