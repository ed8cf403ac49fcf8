//! autottl - A thread-safe bounded TTL cache with background expiry
//!
//! Entries expire after a fixed time-to-live even if nobody touches them: a
//! single process-wide coordinator thread sweeps every live cache at a tenth
//! of its TTL, without keeping any cache alive.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{AutoTtlCache, CacheBuilder, CacheStats, Clock, ManualClock, MonotonicClock};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::ExpiryCoordinator;
