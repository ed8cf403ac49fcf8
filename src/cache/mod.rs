//! Cache Module
//!
//! Provides a bounded in-memory map with TTL expiration and LRU eviction, and
//! the synchronized wrapper that registers it for background expiry.

mod clock;
mod entry;
mod lru;
mod stats;
mod store;
mod synchronized;


// Re-export public types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{SizeFn, TtlMap};
pub use synchronized::{AutoTtlCache, CacheBuilder};
