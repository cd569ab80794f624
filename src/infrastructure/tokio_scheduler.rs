use crate::domain::ports::{Scheduler, Task, TimerHandle};
use crate::domain::time::{Clock, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Timers = Arc<Mutex<HashMap<TimerHandle, JoinHandle<()>>>>;

/// Real-time scheduler backed by tokio timers.
///
/// Each scheduled task is a spawned `sleep` followed by the task itself.
/// Cancelling aborts the sleeping task.
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    timers: Timers,
    next_id: Arc<AtomicU64>,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::default(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Scheduler on the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of timers that have not fired or been cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }
}

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<TimerHandle, JoinHandle<()>>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let timers = Arc::clone(&self.timers);

        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = lock(&self.timers);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before running so a cancel issued by the task itself
            // cannot abort it halfway through.
            if lock(&timers).remove(&handle).is_none() {
                return;
            }
            task.await;
        });
        guard.insert(handle, join);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(join) = lock(&self.timers).remove(&handle) {
            join.abort();
        }
    }
}

/// Milliseconds since the clock was created, on tokio's clock.
///
/// Follows tokio's paused/advanced time in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_millis();
        Timestamp::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}
