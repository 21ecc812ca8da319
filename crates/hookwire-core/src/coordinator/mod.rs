//! Thread-safe entry points for host callers.
//!
//! A [`Coordinator`] owns one worker thread, which in turn owns the current
//! interpreter. Callers on any thread submit tasks and either block for the
//! outcome or register a callback; the worker runs tasks one at a time in
//! submission order and reloads the interpreter when its files change.
//!
//! # Module Structure
//!
//! - `observer` - Lifecycle callbacks
//! - `worker` - The worker thread and its reload state machine

mod observer;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{ConfigSource, ExecutorConfig};
use crate::error::{Error, Result};
use crate::hooks::{HookKey, HookRegistry};
use crate::interpreter::{CapturedOutput, Callable, InterpreterFactory, LoadSpec};
use crate::outcome::Outcome;
use crate::queue::TaskQueue;
use crate::status::{Lifecycle, Status};
use crate::task::{Kwargs, Resolution, Task, TaskId};
use crate::watch::ChangeWatcher;

pub use observer::{NoopObserver, TaskObserver};

use worker::{Shared, Worker};

/// Handle to a submitted task.
pub struct TaskHandle {
    task: Arc<Task>,
    shared: Arc<Shared>,
    config: ExecutorConfig,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Block until the task finishes or can no longer run.
    pub fn wait(&self) -> Outcome<Value> {
        self.shared
            .queue
            .await_outcome(&self.task, self.config.poll_interval(), self.config.warn_after())
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.task.resolution()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task).finish()
    }
}

/// Script execution coordinator.
///
/// Dropping the coordinator shuts it down.
pub struct Coordinator {
    shared: Arc<Shared>,
    source: Arc<dyn ConfigSource>,
    factory: Arc<dyn InterpreterFactory>,
    config: ExecutorConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Start a coordinator and its worker thread.
    ///
    /// Returns once the worker is running; the first interpreter is loaded in
    /// the background while `status()` reports `Starting`.
    pub fn new(
        source: Arc<dyn ConfigSource>,
        factory: Arc<dyn InterpreterFactory>,
        config: ExecutorConfig,
    ) -> Result<Self> {
        Self::with_observer(source, factory, config, Arc::new(NoopObserver))
    }

    /// Like [`Coordinator::new`], reporting lifecycle events to `observer`.
    pub fn with_observer(
        source: Arc<dyn ConfigSource>,
        factory: Arc<dyn InterpreterFactory>,
        config: ExecutorConfig,
        observer: Arc<dyn TaskObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = TaskQueue::new(source.is_enabled()).with_observer(observer.clone());
        let shared = Arc::new(Shared::new(queue, observer));
        let worker = Worker::new(
            shared.clone(),
            factory.clone(),
            ChangeWatcher::new(source.clone()),
            config.clone(),
        );

        let handle = thread::Builder::new()
            .name("hookwire-worker".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            source,
            factory,
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue a call. A task that is not admitted is already finished
    /// (rejected, outcome `Empty`) when this returns.
    pub fn submit(&self, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> TaskHandle {
        let task = self.shared.queue.create_task(name, args, kwargs);
        self.shared.queue.enqueue(task.clone());
        self.handle(task)
    }

    /// Queue a call, failing with `AdmissionRejected` if it is not admitted.
    pub fn try_submit(&self, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Result<TaskHandle> {
        let task = self.shared.queue.create_task(name, args, kwargs);
        if self.shared.queue.enqueue(task.clone()) {
            Ok(self.handle(task))
        } else {
            Err(Error::AdmissionRejected(task.name().to_string()))
        }
    }

    fn handle(&self, task: Arc<Task>) -> TaskHandle {
        TaskHandle {
            task,
            shared: self.shared.clone(),
            config: self.config.clone(),
        }
    }

    /// Call a script function and wait for its raw outcome.
    ///
    /// A missing function yields `Empty`, as does a call that was not
    /// admitted. Use [`Coordinator::call_strict`] to tell those apart.
    pub fn call_value(&self, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Outcome<Value> {
        self.submit(name, args, kwargs).wait()
    }

    /// Call a script function and convert its return value to `T`.
    ///
    /// A value that does not deserialize as `T` yields `Error::CastMismatch`.
    pub fn call<T: DeserializeOwned>(&self, name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Outcome<T> {
        let name = name.into();
        let outcome = self.call_value(name.clone(), args, kwargs);
        cast(&name, outcome)
    }

    /// Like [`Coordinator::call`], but a missing function is
    /// `Error::HookNotImplemented` and a call that was not admitted is
    /// `Error::AdmissionRejected`.
    pub fn call_strict<T: DeserializeOwned>(
        &self,
        name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Outcome<T> {
        let name = name.into();
        let handle = self.submit(name.clone(), args, kwargs);
        let outcome = handle.wait();
        match handle.resolution() {
            Some(Resolution::HookMissing) => Outcome::Error(Error::HookNotImplemented(name)),
            Some(Resolution::Rejected) | None => Outcome::Error(Error::AdmissionRejected(name)),
            _ => cast(&name, outcome),
        }
    }

    /// Queue a call and return immediately. `on_success` runs on a pool
    /// thread, and only if the call produces a value.
    pub fn call_async(
        &self,
        name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Kwargs,
        on_success: impl FnOnce(Value) + Send + 'static,
    ) -> TaskHandle {
        let task = self.shared.queue.create_task(name, args, kwargs);
        task.on_complete(move |outcome| {
            if let Outcome::Success(value) = outcome {
                on_success(value);
            }
        });
        self.shared.queue.enqueue(task.clone());
        self.handle(task)
    }

    /// Call the function implementing `hook`.
    pub fn call_hook(&self, hook: &HookKey, args: Vec<Value>) -> Outcome<Value> {
        self.call_value(hook.function_name(), args, Kwargs::new())
    }

    /// Resume admitting and dispatching tasks.
    pub fn enable(&self) {
        tracing::info!(target: "hookwire::worker", "Enabling script calls");
        self.shared.queue.set_enabled(true);
    }

    /// Stop admitting and dispatching tasks; queued tasks are rejected. The
    /// interpreter stays loaded.
    pub fn disable(&self) {
        tracing::info!(target: "hookwire::worker", "Disabling script calls");
        self.shared.queue.set_enabled(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.status().enabled
    }

    pub fn is_running(&self) -> bool {
        self.status().lifecycle == Lifecycle::Running
    }

    pub fn is_starting(&self) -> bool {
        self.status().lifecycle == Lifecycle::Starting
    }

    pub fn status(&self) -> Status {
        self.shared.queue.status()
    }

    /// Number of tasks waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Wake the worker now instead of at its next poll tick.
    pub fn notify_external_change(&self) {
        tracing::debug!(target: "hookwire::worker", "External change notified");
        self.shared.queue.wake();
    }

    /// Functions of the currently loaded script.
    pub fn callables(&self) -> Vec<Callable> {
        self.shared
            .callables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hooks implemented by the currently loaded script.
    pub fn hooks(&self) -> HookRegistry {
        HookRegistry::from_callables(&self.callables())
    }

    /// Evaluate `code` in a fresh interpreter with the current framework and
    /// script loaded. Runs on the calling thread, outside the queue.
    pub fn eval_and_capture(&self, code: &str) -> CapturedOutput {
        let settings = self.source.current();
        let spec = LoadSpec {
            script: settings.script,
            framework: settings.framework,
            environment: settings.environment,
        };
        self.factory.evaluate(&spec, code)
    }

    /// Stop the worker: reject queued tasks, cancel the running script, tear
    /// the interpreter down and join the thread. Idempotent.
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        tracing::info!(target: "hookwire::worker", "Shutting down");
        self.shared.queue.shutdown();
        self.shared.abort_current();
        if handle.join().is_err() {
            tracing::error!(target: "hookwire::worker", "Worker thread panicked during shutdown");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("status", &self.status())
            .field("pending", &self.pending())
            .finish()
    }
}

fn cast<T: DeserializeOwned>(name: &str, outcome: Outcome<Value>) -> Outcome<T> {
    outcome.flat_map(|value| match serde_json::from_value(value) {
        Ok(v) => Outcome::Success(v),
        Err(e) => Outcome::Error(Error::CastMismatch {
            function: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            message: e.to_string(),
        }),
    })
}
