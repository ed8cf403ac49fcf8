//! Expiry Coordinator
//!
//! One background thread per process sweeps every live cache at a tenth of
//! its TTL. The coordinator only holds weak handles to caches; caches hold
//! the coordinator strongly, so the thread winds down once the last cache is
//! dropped and a later cache starts a fresh one.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{const_mutex, Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use super::schedule::{Expire, Schedule, ScheduledExpiry};
use crate::error::{CacheError, Result};

/// Longest the coordinator thread sleeps between checks.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Weak slot for the process-wide coordinator.
static COORDINATOR: Mutex<Option<Weak<ExpiryCoordinator>>> = const_mutex(None);

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);
static RUNNING_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Number of coordinator loops currently running in this process.
///
/// Briefly 2 while a cancelled coordinator finishes its last sleep after a
/// replacement has started.
pub fn running_threads() -> usize {
    RUNNING_THREADS.load(Ordering::SeqCst)
}

/// State shared between the coordinator handle and its thread.
struct Shared {
    schedule: Mutex<Schedule>,
    wakeup: Condvar,
    cancelled: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            schedule: Mutex::new(Schedule::new()),
            wakeup: Condvar::new(),
            cancelled: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// == Expiry Coordinator ==
/// Handle to the background sweeper shared by all caches.
///
/// Dropping the last handle cancels the thread.
pub struct ExpiryCoordinator {
    id: u64,
    shared: Arc<Shared>,
}

impl ExpiryCoordinator {
    // == Acquire ==
    /// Returns the live process-wide coordinator, starting one if needed.
    ///
    /// Does not return until the background loop is running.
    pub(crate) fn acquire() -> Result<Arc<Self>> {
        let mut slot = COORDINATOR.lock();
        if let Some(existing) = slot.as_ref().and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let coordinator = Arc::new(Self::start()?);
        *slot = Some(Arc::downgrade(&coordinator));
        Ok(coordinator)
    }

    /// Spawns a coordinator thread and waits for its readiness signal.
    fn start() -> Result<Self> {
        let id = NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed);
        debug!(coordinator = id, "Starting expiry coordinator");

        let shared = Arc::new(Shared::new());
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let loop_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("autottl-expiry-{id}"))
            .spawn(move || run(id, loop_shared, ready_tx))?;

        ready_rx.recv().map_err(|_| {
            CacheError::Spawn(io::Error::new(
                io::ErrorKind::Other,
                "expiry coordinator exited before it was ready",
            ))
        })?;

        Ok(Self { id, shared })
    }

    // == Register ==
    /// Schedules the first sweep of a cache one check interval from now.
    ///
    /// Returns the id the coordinator logs the cache under.
    pub(crate) fn register(&self, cache: Weak<dyn Expire>, ttl: Duration) -> u64 {
        let cache_id = NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed);
        let entry = ScheduledExpiry::first(cache_id, cache, ttl, Instant::now());
        trace!(coordinator = self.id, cache = cache_id, due_in = ?entry.period, "Registering cache");

        let mut schedule = self.shared.schedule.lock();
        schedule.push(entry);
        self.shared.wakeup.notify_one();
        cache_id
    }

    /// Process-unique id of this coordinator instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of sweeps waiting in the schedule.
    ///
    /// A sweep being fired at the moment of the call is not counted.
    pub fn pending(&self) -> usize {
        self.shared.schedule.lock().len()
    }

    /// True while this coordinator's thread is looping.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl Drop for ExpiryCoordinator {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        // Notify under the lock so the loop cannot miss it between its
        // cancellation check and its wait.
        let _schedule = self.shared.schedule.lock();
        self.shared.wakeup.notify_all();
        debug!(coordinator = self.id, "Cancelled expiry coordinator");
    }
}

impl std::fmt::Debug for ExpiryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryCoordinator")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Marks the loop as running for as long as it lives.
struct RunningGuard<'a> {
    shared: &'a Shared,
}

impl<'a> RunningGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.running.store(true, Ordering::Release);
        RUNNING_THREADS.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        RUNNING_THREADS.fetch_sub(1, Ordering::SeqCst);
    }
}

// == Coordinator Loop ==
fn run(id: u64, shared: Arc<Shared>, ready: SyncSender<()>) {
    let _running = RunningGuard::enter(&shared);
    debug!(coordinator = id, "Expiry coordinator thread started");
    let _ = ready.send(());
    drop(ready);

    while !shared.is_cancelled() {
        let due = shared.schedule.lock().take_due(Instant::now());
        for entry in due {
            if let Some(next) = fire(id, entry) {
                shared.schedule.lock().push(next);
            }
        }

        let mut schedule = shared.schedule.lock();
        if shared.is_cancelled() {
            break;
        }
        let tick = schedule.next_due().map_or(MAX_POLL_INTERVAL, |due| {
            due.saturating_duration_since(Instant::now())
                .min(MAX_POLL_INTERVAL)
        });
        trace!(coordinator = id, ?tick, pending = schedule.len(), "Expiry coordinator sleeping");
        if !tick.is_zero() {
            shared.wakeup.wait_for(&mut schedule, tick);
        }
    }

    debug!(coordinator = id, "Expiry coordinator thread ending");
}

/// Sweeps one due cache and returns its next schedule entry, if any.
///
/// Errors and panics from the sweep are logged and contained.
fn fire(coordinator: u64, entry: ScheduledExpiry) -> Option<ScheduledExpiry> {
    let cache_id = entry.cache_id;
    let Some(cache) = entry.cache.upgrade() else {
        debug!(coordinator, cache = cache_id, "Cache released, dropping from schedule");
        return None;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| cache.expire())) {
        Ok(Ok(0)) => trace!(coordinator, cache = cache_id, "No expired entries"),
        Ok(Ok(removed)) => debug!(coordinator, cache = cache_id, removed, "Expired cache entries"),
        Ok(Err(err)) => warn!(coordinator, cache = cache_id, error = %err, "Background expiry failed"),
        Err(payload) => {
            let err = CacheError::BackgroundTask(panic_message(payload.as_ref()));
            error!(coordinator, cache = cache_id, error = %err, "Background expiry panicked");
        }
    }

    // May be the last strong handle; reschedule sees the release.
    drop(cache);
    entry.reschedule(Instant::now())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
