//! Units of work submitted to the script.
//!
//! A [`Task`] names a script function and carries its arguments. It is
//! finished exactly once, either by the worker after dispatch or by the queue
//! when it is rejected without running.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::{Error, panic_message};
use crate::outcome::Outcome;

/// Keyword arguments for a script call.
pub type Kwargs = serde_json::Map<String, Value>;

/// Callback run once a task is finished.
type CompletionCallback = Box<dyn FnOnce(Outcome<Value>) + Send + 'static>;

/// Unique identifier of a task, allocated in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Numeric value of the identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The function returned a value.
    Returned,
    /// The function ran and returned nothing.
    NoValue,
    /// The script does not define the function.
    HookMissing,
    /// The function raised.
    Raised,
    /// The task never ran (not admitted, drained, or shut down).
    Rejected,
}

#[derive(Default)]
struct TaskState {
    outcome: Outcome<Value>,
    resolution: Option<Resolution>,
    callbacks: Vec<CompletionCallback>,
}

/// A call waiting to be run by the worker.
pub struct Task {
    id: TaskId,
    name: String,
    args: Vec<Value>,
    kwargs: Kwargs,
    state: Mutex<TaskState>,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            id,
            name: name.into(),
            args,
            kwargs,
            state: Mutex::new(TaskState::default()),
        }
    }

    // The state is only ever replaced wholesale, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the script function to call.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    pub fn is_finished(&self) -> bool {
        self.lock().resolution.is_some()
    }

    /// Current outcome; `Empty` until the task finishes.
    pub fn outcome(&self) -> Outcome<Value> {
        self.lock().outcome.clone()
    }

    /// Why the task finished, or `None` while it is pending.
    pub fn resolution(&self) -> Option<Resolution> {
        self.lock().resolution
    }

    /// Finish the task with a value.
    pub(crate) fn resolve(&self, value: Value) -> bool {
        self.complete(Outcome::Success(value), Resolution::Returned)
    }

    /// Finish the task without a value, or with `error`.
    pub(crate) fn reject(&self, error: Option<Error>) -> bool {
        match error {
            Some(e) => self.complete(Outcome::Error(e), Resolution::Raised),
            None => self.complete(Outcome::Empty, Resolution::Rejected),
        }
    }

    /// Finish the task. Returns `false`, leaving the task untouched, if it
    /// was already finished.
    pub(crate) fn complete(&self, outcome: Outcome<Value>, resolution: Resolution) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if state.resolution.is_some() {
                tracing::warn!(
                    target: "hookwire::task",
                    "Ignoring second completion of task {} ({})",
                    self.id,
                    self.name
                );
                return false;
            }
            state.outcome = outcome.clone();
            state.resolution = Some(resolution);
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            self.spawn_callback(callback, outcome.clone());
        }
        true
    }

    /// Run `callback` on the rayon pool once the task is finished.
    ///
    /// Runs it right away (still on the pool) if the task already finished.
    pub fn on_complete(&self, callback: impl FnOnce(Outcome<Value>) + Send + 'static) {
        let outcome = {
            let mut state = self.lock();
            if state.resolution.is_none() {
                state.callbacks.push(Box::new(callback));
                return;
            }
            state.outcome.clone()
        };
        self.spawn_callback(Box::new(callback), outcome);
    }

    /// Run `callback` on the rayon pool. A panic in the callback is logged
    /// and goes no further.
    fn spawn_callback(&self, callback: CompletionCallback, outcome: Outcome<Value>) {
        let id = self.id;
        let name = self.name.clone();
        rayon::spawn(move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
                tracing::error!(
                    target: "hookwire::task",
                    "Completion callback for task {} ({}) panicked: {}",
                    id,
                    name,
                    panic_message(panic.as_ref())
                );
            }
        });
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("resolution", &self.resolution())
            .finish()
    }
}
