//! FIFO task queue shared by caller threads and the worker.
//!
//! The queue is the coordinator's only monitor: a single mutex guards the
//! pending tasks together with the lifecycle and admission flags, and a single
//! condition variable carries every notification (task queued, task finished,
//! status changed, wake-up requested). Waits are always bounded so both sides
//! periodically re-check their conditions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::coordinator::{NoopObserver, TaskObserver};
use crate::outcome::Outcome;
use crate::status::{Lifecycle, Status};
use crate::task::{Kwargs, Resolution, Task, TaskId};

/// What the worker got from a bounded wait on the queue.
#[derive(Debug)]
pub(crate) enum Next {
    /// The oldest pending task.
    Task(Arc<Task>),
    /// Timed out or woken without a task; re-check conditions.
    Idle,
    /// The coordinator is shutting down.
    Shutdown,
}

struct QueueState {
    tasks: VecDeque<Arc<Task>>,
    lifecycle: Lifecycle,
    enabled: bool,
    wake_requested: bool,
    shutdown: bool,
}

impl QueueState {
    fn status(&self) -> Status {
        Status {
            lifecycle: self.lifecycle,
            enabled: self.enabled,
        }
    }

    fn accepts_tasks(&self) -> bool {
        !self.shutdown && self.status().accepts_tasks()
    }

    /// Empty the queue, finishing every task as rejected.
    fn reject_pending(&mut self) -> Vec<Arc<Task>> {
        let rejected: Vec<_> = self.tasks.drain(..).collect();
        for task in &rejected {
            task.reject(None);
        }
        rejected
    }
}

/// Unbounded FIFO of tasks with one consumer.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    signal: Condvar,
    next_id: AtomicU64,
    observer: Arc<dyn TaskObserver>,
}

impl TaskQueue {
    /// Create an empty queue in the `Starting` state.
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                lifecycle: Lifecycle::Starting,
                enabled,
                wake_requested: false,
                shutdown: false,
            }),
            signal: Condvar::new(),
            next_id: AtomicU64::new(1),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report submissions, rejections and status changes to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = observer;
        self
    }

    // Every mutation leaves QueueState consistent before anything that can
    // panic runs, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_rejected(&self, rejected: &[Arc<Task>]) {
        if rejected.is_empty() {
            return;
        }
        tracing::debug!(target: "hookwire::task", "Rejected {} queued task(s)", rejected.len());
        for task in rejected {
            self.observer.on_finished(task, Resolution::Rejected);
        }
    }

    /// Build a task with the next identifier.
    pub fn create_task(&self, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Arc<Task> {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = Arc::new(Task::new(id, name, args, kwargs));
        tracing::trace!(target: "hookwire::task", "Created task {} ({})", task.id(), task.name());
        task
    }

    /// Append a task to the tail.
    ///
    /// When the coordinator is disabled, stopped or shutting down the task is
    /// rejected on the spot (outcome `Empty`) and `false` is returned, so no
    /// caller ever waits on a queue nobody drains.
    pub fn enqueue(&self, task: Arc<Task>) -> bool {
        let mut state = self.lock();
        if state.accepts_tasks() {
            state.tasks.push_back(task.clone());
            self.signal.notify_all();
            drop(state);

            tracing::debug!(target: "hookwire::task", "Submitted task {} ({})", task.id(), task.name());
            self.observer.on_submitted(&task);
            true
        } else {
            let status = state.status();
            drop(state);

            tracing::debug!(
                target: "hookwire::task",
                "Rejected task {} ({}): coordinator is {}",
                task.id(),
                task.name(),
                status
            );
            if task.reject(None) {
                self.observer.on_finished(&task, Resolution::Rejected);
            }
            false
        }
    }

    /// Block until `task` is finished or can be proven never to run.
    ///
    /// Waits in slices of `poll`; a task still pending after `warn_after` is
    /// logged (and again every `warn_after`). Returns the task's current
    /// outcome, which is `Empty` if it gave up early.
    pub fn await_outcome(&self, task: &Task, poll: Duration, warn_after: Duration) -> Outcome<Value> {
        tracing::trace!(target: "hookwire::task", "Awaiting task {} ({})", task.id(), task.name());
        let started = Instant::now();
        let mut last_warning = started;

        let mut state = self.lock();
        while !task.is_finished() && state.accepts_tasks() {
            let (guard, _) = self
                .signal
                .wait_timeout(state, poll)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;

            if !task.is_finished() && last_warning.elapsed() >= warn_after {
                tracing::warn!(
                    target: "hookwire::task",
                    "Task {} ({}) is still waiting after {:.1}s",
                    task.id(),
                    task.name(),
                    started.elapsed().as_secs_f64()
                );
                last_warning = Instant::now();
            }
        }
        drop(state);

        tracing::trace!(target: "hookwire::task", "Finished awaiting task {} ({})", task.id(), task.name());
        task.outcome()
    }

    /// Wake every waiter after a task has been finished.
    ///
    /// Notifying under the lock means a waiter that saw the task unfinished is
    /// already parked on the condition when this runs.
    pub(crate) fn notify_finished(&self) {
        let _state = self.lock();
        self.signal.notify_all();
    }

    /// Pop the head, waiting up to `timeout` for one to arrive.
    ///
    /// Returns early on a wake-up request or shutdown. Nothing is popped while
    /// the coordinator is disabled.
    pub(crate) fn next_task(&self, timeout: Duration) -> Next {
        self.wait_next(timeout, true)
    }

    /// Wait up to `timeout` for a wake-up request or shutdown, leaving any
    /// queued tasks in place.
    pub(crate) fn wait_for_wake(&self, timeout: Duration) -> Next {
        self.wait_next(timeout, false)
    }

    fn wait_next(&self, timeout: Duration, take: bool) -> Next {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return Next::Shutdown;
            }
            if state.wake_requested {
                state.wake_requested = false;
                return Next::Idle;
            }
            if take
                && state.enabled
                && let Some(task) = state.tasks.pop_front()
            {
                return Next::Task(task);
            }

            let now = Instant::now();
            if now >= deadline {
                return Next::Idle;
            }
            let (guard, _) = self
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Remove and return every task currently queued, in order.
    pub(crate) fn take_pending(&self) -> Vec<Arc<Task>> {
        self.lock().tasks.drain(..).collect()
    }

    /// Reject every queued task with an `Empty` outcome.
    pub fn reject_all(&self) -> usize {
        let rejected = {
            let mut state = self.lock();
            let rejected = state.reject_pending();
            self.signal.notify_all();
            rejected
        };
        self.report_rejected(&rejected);
        rejected.len()
    }

    /// Ask the worker to re-check its conditions now.
    pub fn wake(&self) {
        let mut state = self.lock();
        state.wake_requested = true;
        self.signal.notify_all();
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        let status = {
            let mut state = self.lock();
            if state.lifecycle == lifecycle {
                return;
            }
            state.lifecycle = lifecycle;
            self.signal.notify_all();
            state.status()
        };
        tracing::debug!(target: "hookwire::worker", "Coordinator is {}", status);
        self.observer.on_status(status);
    }

    /// Toggle admission. Disabling rejects whatever is still queued.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        let (status, rejected) = {
            let mut state = self.lock();
            state.enabled = enabled;
            let rejected = if enabled { Vec::new() } else { state.reject_pending() };
            self.signal.notify_all();
            (state.status(), rejected)
        };
        self.report_rejected(&rejected);
        self.observer.on_status(status);
    }

    /// Stop admitting tasks for good and reject what is queued.
    pub(crate) fn shutdown(&self) {
        let rejected = {
            let mut state = self.lock();
            state.shutdown = true;
            let rejected = state.reject_pending();
            self.signal.notify_all();
            rejected
        };
        self.report_rejected(&rejected);
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn status(&self) -> Status {
        self.lock().status()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.tasks.len())
            .field("status", &state.status())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const POLL: Duration = Duration::from_millis(20);

    fn running_queue() -> Arc<TaskQueue> {
        let queue = Arc::new(TaskQueue::new(true));
        queue.set_lifecycle(Lifecycle::Running);
        queue
    }

    fn submit(queue: &TaskQueue, name: &str) -> Arc<Task> {
        let task = queue.create_task(name, Vec::new(), Kwargs::new());
        queue.enqueue(task.clone());
        task
    }

    fn pop(queue: &TaskQueue) -> Arc<Task> {
        match queue.next_task(Duration::from_secs(1)) {
            Next::Task(task) => task,
            other => panic!("expected a task, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = running_queue();
        for name in ["a", "b", "c"] {
            submit(&queue, name);
        }
        let names: Vec<_> = (0..3).map(|_| pop(&queue).name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ids_follow_submission_order() {
        let queue = running_queue();
        let first = submit(&queue, "a");
        let second = submit(&queue, "b");
        assert!(first.id() < second.id());
    }

    #[test]
    fn test_enqueue_rejected_when_disabled() {
        let queue = running_queue();
        queue.set_enabled(false);

        let task = queue.create_task("request", Vec::new(), Kwargs::new());
        assert!(!queue.enqueue(task.clone()));
        assert!(task.is_finished());
        assert!(task.outcome().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_rejected_when_stopped() {
        let queue = running_queue();
        queue.set_lifecycle(Lifecycle::Stopped);
        let task = queue.create_task("request", Vec::new(), Kwargs::new());
        assert!(!queue.enqueue(task.clone()));
        assert!(task.is_finished());
    }

    #[test]
    fn test_enqueue_accepted_while_starting() {
        let queue = Arc::new(TaskQueue::new(true));
        let task = submit(&queue, "request");
        assert!(!task.is_finished());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_await_returns_when_task_completes() {
        let queue = running_queue();
        let task = submit(&queue, "add");

        let worker = {
            let queue = queue.clone();
            thread::spawn(move || {
                let task = pop(&queue);
                thread::sleep(Duration::from_millis(50));
                task.resolve(Value::from(5));
                queue.notify_finished();
            })
        };

        let outcome = queue.await_outcome(&task, POLL, Duration::from_secs(10));
        worker.join().unwrap();
        assert_eq!(outcome, Outcome::Success(Value::from(5)));
    }

    #[test]
    fn test_await_does_not_hang_when_disabled() {
        let queue = running_queue();
        let task = submit(&queue, "add");

        let disabler = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                queue.set_enabled(false);
            })
        };

        let started = Instant::now();
        let outcome = queue.await_outcome(&task, POLL, Duration::from_secs(10));
        disabler.join().unwrap();

        assert!(outcome.is_empty());
        assert!(task.is_finished());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_next_task_times_out_idle() {
        let queue = running_queue();
        let started = Instant::now();
        assert!(matches!(queue.next_task(POLL), Next::Idle));
        assert!(started.elapsed() >= POLL);
    }

    #[test]
    fn test_next_task_holds_tasks_while_disabled() {
        let queue = running_queue();
        submit(&queue, "a");
        {
            let mut state = queue.lock();
            state.enabled = false;
        }
        assert!(matches!(queue.next_task(POLL), Next::Idle));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_wake_interrupts_wait() {
        let queue = running_queue();
        let waker = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.wake();
            })
        };
        let started = Instant::now();
        assert!(matches!(queue.wait_for_wake(Duration::from_secs(10)), Next::Idle));
        waker.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_reject_all_finishes_every_task() {
        let queue = running_queue();
        let tasks: Vec<_> = (0..5).map(|i| submit(&queue, &format!("t{}", i))).collect();
        assert_eq!(queue.reject_all(), 5);
        assert!(queue.is_empty());
        assert!(tasks.iter().all(|t| t.is_finished() && t.outcome().is_empty()));
    }

    #[test]
    fn test_shutdown_rejects_and_signals() {
        let queue = running_queue();
        let task = submit(&queue, "a");
        queue.shutdown();
        assert!(task.is_finished());
        assert!(matches!(queue.next_task(POLL), Next::Shutdown));
        assert!(!queue.enqueue(queue.create_task("b", Vec::new(), Kwargs::new())));
    }

    #[test]
    fn test_concurrent_producers_keep_per_thread_order() {
        let queue = running_queue();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        submit(&queue, &format!("{}:{}", p, i));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut popped = Vec::new();
        while let Next::Task(task) = queue.next_task(POLL) {
            popped.push(task);
        }
        assert_eq!(popped.len(), 100);

        // Popping order is exactly id (enqueue) order.
        let ids: Vec<_> = popped.iter().map(|t| t.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
