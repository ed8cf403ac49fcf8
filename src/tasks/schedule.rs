//! Expiry Schedule
//!
//! Min-heap of pending sweeps, keyed by due instant. Entries hold only weak
//! handles to the caches they sweep.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Fraction of a cache's TTL between two background sweeps.
pub const EXPIRY_CHECK_DIVISOR: u32 = 10;

/// Floor on the sweep period, so tiny TTLs cannot spin the coordinator.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Ceiling on the sweep period, so a huge TTL still yields a representable
/// due instant.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(86_400);

// == Expire Trait ==
/// Something the coordinator can sweep.
pub trait Expire: Send + Sync {
    /// Removes expired entries, returning how many were removed.
    fn expire(&self) -> Result<usize>;
}

/// Sweep period for a cache with the given TTL.
pub fn check_interval(ttl: Duration) -> Duration {
    (ttl / EXPIRY_CHECK_DIVISOR).clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL)
}

fn due_after(now: Instant, period: Duration) -> Instant {
    now.checked_add(period).unwrap_or(now)
}

// == Scheduled Expiry ==
/// One pending sweep of one cache.
pub struct ScheduledExpiry {
    pub due: Instant,
    pub cache_id: u64,
    pub period: Duration,
    pub cache: Weak<dyn Expire>,
}

impl ScheduledExpiry {
    /// First sweep of a newly registered cache, one period from `now`.
    pub fn first(cache_id: u64, cache: Weak<dyn Expire>, ttl: Duration, now: Instant) -> Self {
        let period = check_interval(ttl);
        Self {
            due: due_after(now, period),
            cache_id,
            period,
            cache,
        }
    }

    /// Next sweep, measured from `now` rather than the previous due instant
    /// so slow ticks do not compound. None once the cache is gone.
    pub fn reschedule(self, now: Instant) -> Option<Self> {
        if self.cache.strong_count() == 0 {
            return None;
        }
        Some(Self {
            due: due_after(now, self.period),
            ..self
        })
    }
}

impl PartialEq for ScheduledExpiry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledExpiry {}

impl PartialOrd for ScheduledExpiry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledExpiry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then(self.cache_id.cmp(&other.cache_id))
    }
}

// == Schedule ==
/// Pending sweeps ordered earliest first.
#[derive(Default)]
pub struct Schedule {
    heap: BinaryHeap<Reverse<ScheduledExpiry>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ScheduledExpiry) {
        debug_assert!(
            !self.heap.iter().any(|Reverse(e)| e.cache_id == entry.cache_id),
            "cache {} already has a pending sweep",
            entry.cache_id
        );
        self.heap.push(Reverse(entry));
    }

    // == Take Due ==
    /// Removes and returns every entry due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledExpiry> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Due instant of the earliest pending entry.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
