//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and its expiry coordinator.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid construction parameters (zero maxsize or ttl)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Key absent or expired, or the cache is empty
    #[error("Key not found")]
    KeyNotFound,

    /// Value cannot fit even after eviction
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A background sweep failed; only ever logged by the coordinator
    #[error("Background expiry failed: {0}")]
    BackgroundTask(String),

    /// The coordinator thread could not be started
    #[error("Failed to start expiry coordinator: {0}")]
    Spawn(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
