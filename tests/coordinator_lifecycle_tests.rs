//! Integration tests for the expiry coordinator lifecycle
//!
//! The coordinator is process-wide, so these tests take a file-local lock and
//! start from a state with no coordinator thread running.

mod common;

use std::time::Duration;

use autottl::tasks::{running_threads, MAX_POLL_INTERVAL};
use autottl::AutoTtlCache;
use parking_lot::{const_mutex, Mutex, MutexGuard};

use common::{init_tracing, wait_until};

static SERIAL: Mutex<()> = const_mutex(());

/// Serializes the test and waits out any coordinator left by a previous one.
fn isolated() -> MutexGuard<'static, ()> {
    init_tracing();
    let guard = SERIAL.lock();
    assert!(
        wait_until(MAX_POLL_INTERVAL * 3, || running_threads() == 0),
        "a previous coordinator did not shut down"
    );
    guard
}

fn cache(ttl_ms: u64) -> AutoTtlCache<String, u32> {
    AutoTtlCache::new(10, Duration::from_millis(ttl_ms)).unwrap()
}

#[test]
fn test_overlapping_caches_share_one_thread() {
    let _serial = isolated();

    let first = cache(100);
    assert_eq!(running_threads(), 1);

    let second = cache(300);
    assert_eq!(running_threads(), 1);
    assert_eq!(first.coordinator().id(), second.coordinator().id());
}

#[test]
fn test_released_caches_leave_schedule() {
    let _serial = isolated();

    let mut caches: Vec<_> = (0..5).map(|_| cache(100)).collect();
    let kept = caches.remove(0);
    drop(caches);

    assert!(
        wait_until(MAX_POLL_INTERVAL * 2, || kept.coordinator().pending() == 1),
        "pending entries should converge to the one live cache"
    );
}

#[test]
fn test_coordinator_stops_with_last_cache() {
    let _serial = isolated();

    let only = cache(100);
    let clone = only.clone();
    assert_eq!(running_threads(), 1);

    drop(only);
    assert!(clone.coordinator().is_running(), "a clone keeps the cache alive");

    drop(clone);
    assert!(wait_until(MAX_POLL_INTERVAL * 2, || running_threads() == 0));
}

#[test]
fn test_coordinator_restarts_after_teardown() {
    let _serial = isolated();

    let before = cache(100);
    let first_id = before.coordinator().id();
    drop(before);
    assert!(wait_until(MAX_POLL_INTERVAL * 2, || running_threads() == 0));

    let after = cache(500);
    assert_ne!(after.coordinator().id(), first_id);
    assert!(after.coordinator().is_running());
    assert_eq!(running_threads(), 1);

    after.set("k".to_string(), 1).unwrap();
    assert_eq!(after.len(), 1);
    assert!(
        wait_until(MAX_POLL_INTERVAL * 3, || after.len() == 0),
        "restarted coordinator should still sweep"
    );
}
