use crate::domain::ports::{Scheduler, Task, TimerHandle};
use crate::domain::time::{Clock, Timestamp};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A deterministic scheduler and clock that only moves when told to.
///
/// Tasks run in `(due time, scheduling order)` order when the clock is
/// advanced past their due time. While a task runs, `now()` reports its due
/// time, so anything it schedules is offset from that instant.
///
/// Used by tests and by the batch CLI to fast-forward through lifecycles
/// without waiting on the wall clock.
#[derive(Default)]
pub struct VirtualClock {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    now: Timestamp,
    next_seq: u64,
    queue: BTreeMap<(Timestamp, u64), Task>,
}

impl VirtualClock {
    /// Creates a clock at time zero with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            state: Mutex::new(State {
                now,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<Timestamp> {
        self.lock().queue.keys().next().map(|(due, _)| *due)
    }

    /// Moves the clock forward by `by`, running every task due on the way.
    ///
    /// Returns the number of tasks run.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        self.advance_to(target).await
    }

    /// Moves the clock to `target`, running every task due at or before it.
    pub async fn advance_to(&self, target: Timestamp) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(Some(target)) {
            task.await;
            ran += 1;
        }
        let mut state = self.lock();
        if state.now < target {
            state.now = target;
        }
        ran
    }

    /// Runs tasks in order until nothing is scheduled, jumping the clock to
    /// each due time.
    pub async fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(None) {
            task.await;
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, limit: Option<Timestamp>) -> Option<Task> {
        let mut state = self.lock();
        let (&(due, seq), _) = state.queue.first_key_value()?;
        if limit.is_some_and(|limit| due > limit) {
            return None;
        }
        let task = state.queue.remove(&(due, seq))?;
        if state.now < due {
            state.now = due;
        }
        Some(task)
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Timestamp {
        self.lock().now
    }
}

impl Scheduler for VirtualClock {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.queue.insert((due, seq), task);
        TimerHandle::new(seq)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.lock().queue.retain(|(_, seq), _| *seq != handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Task {
        let log = Arc::clone(log);
        Box::pin(async move { log.lock().unwrap().push(label) })
    }

    #[tokio::test]
    async fn test_runs_in_due_order() {
        let clock = VirtualClock::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        clock.schedule(Duration::from_secs(6), recorder(&log, "six"));
        clock.schedule(Duration::from_secs(3), recorder(&log, "three"));
        clock.schedule(Duration::from_secs(3), recorder(&log, "three-again"));

        assert_eq!(clock.advance(Duration::from_secs(4)).await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["three", "three-again"]);
        assert_eq!(clock.now(), Timestamp::from_millis(4_000));

        assert_eq!(clock.advance(Duration::from_secs(2)).await, 1);
        assert_eq!(*log.lock().unwrap(), vec!["three", "three-again", "six"]);
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel() {
        let clock = VirtualClock::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = clock.schedule(Duration::from_secs(1), recorder(&log, "cancelled"));
        clock.schedule(Duration::from_secs(2), recorder(&log, "kept"));
        clock.cancel(handle);
        clock.cancel(handle);

        clock.run_until_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
        assert_eq!(clock.now(), Timestamp::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_task_scheduled_from_task_uses_due_time() {
        let clock = Arc::new(VirtualClock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_clock = Arc::clone(&clock);
        let inner_seen = Arc::clone(&seen);
        clock.schedule(
            Duration::from_secs(5),
            Box::pin(async move {
                let seen = Arc::clone(&inner_seen);
                let clock_for_task = Arc::clone(&inner_clock);
                inner_clock.schedule(
                    Duration::from_secs(3),
                    Box::pin(async move { seen.lock().unwrap().push(clock_for_task.now()) }),
                );
            }),
        );

        clock.advance(Duration::from_secs(10)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Timestamp::from_millis(8_000)]);
        assert_eq!(clock.now(), Timestamp::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_starting_at() {
        let clock = VirtualClock::starting_at(Timestamp::from_millis(500));
        clock.schedule(Duration::from_millis(100), Box::pin(async {}));
        assert_eq!(clock.next_due(), Some(Timestamp::from_millis(600)));
    }
}
