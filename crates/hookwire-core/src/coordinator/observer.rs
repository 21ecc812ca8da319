//! Programmatic view of task and interpreter lifecycle events.

use crate::error::Error;
use crate::status::Status;
use crate::task::{Resolution, Task};

/// Callback trait for lifecycle reporting.
///
/// Every method defaults to doing nothing. Methods are called from caller
/// threads and from the worker, never while the coordinator holds a lock, and
/// must not block for long: the worker waits for them.
pub trait TaskObserver: Send + Sync {
    /// Called when a task has been admitted to the queue.
    fn on_submitted(&self, _task: &Task) {}

    /// Called right before the worker invokes the task's function.
    fn on_dispatched(&self, _task: &Task) {}

    /// Called once a task is finished, including tasks that never ran.
    fn on_finished(&self, _task: &Task, _resolution: Resolution) {}

    /// Called after the lifecycle or admission state changed.
    fn on_status(&self, _status: Status) {}

    /// Called when an interpreter could not be started.
    fn on_startup_failed(&self, _error: &Error) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}
