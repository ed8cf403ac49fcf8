//! Background Tasks Module
//!
//! Contains the process-wide expiry coordinator that sweeps every live cache
//! from a single background thread.

mod coordinator;
mod schedule;

pub use coordinator::{running_threads, ExpiryCoordinator, MAX_POLL_INTERVAL};
pub use schedule::{
    check_interval, EXPIRY_CHECK_DIVISOR, MAX_CHECK_INTERVAL, MIN_CHECK_INTERVAL,
};
pub(crate) use schedule::Expire;
