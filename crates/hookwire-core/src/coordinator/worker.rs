//! The interpreter-owning worker thread.
//!
//! ```text
//!            ┌──────────── change detected ───────────┐
//!            ▼                                        │
//!   ┌──► Starting ──ok──► Running (dispatch tasks) ───┘
//!   │        │
//!   │      error
//!   │        ▼
//!   └── Stopped (reject tasks until something changes)
//! ```
//!
//! Shutdown can interrupt any state and is terminal.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::config::ExecutorConfig;
use crate::error::{Error, panic_message};
use crate::hooks::{HookKey, HookRegistry, MessageKind};
use crate::interpreter::{
    AbortHandle, Callable, Interpreter, InterpreterFactory, InvokeError, LoadSpec, ScriptContext,
};
use crate::outcome::Outcome;
use crate::queue::{Next, TaskQueue};
use crate::status::Lifecycle;
use crate::task::{Resolution, Task};
use crate::watch::{ChangeWatcher, FsWaker};

use super::observer::TaskObserver;

/// State shared between the façade and the worker thread.
pub(crate) struct Shared {
    pub(crate) queue: TaskQueue,
    pub(crate) observer: Arc<dyn TaskObserver>,
    /// Functions of the currently loaded script; empty when none is loaded.
    pub(crate) callables: RwLock<Vec<Callable>>,
    /// Abort handle of the live generation, used to cut shutdown short.
    pub(crate) current_abort: Mutex<Option<AbortHandle>>,
}

impl Shared {
    pub(crate) fn new(queue: TaskQueue, observer: Arc<dyn TaskObserver>) -> Self {
        Self {
            queue,
            observer,
            callables: RwLock::new(Vec::new()),
            current_abort: Mutex::new(None),
        }
    }

    fn publish(&self, callables: Vec<Callable>, abort: Option<AbortHandle>) {
        *self.callables.write().unwrap_or_else(PoisonError::into_inner) = callables;
        *self.current_abort.lock().unwrap_or_else(PoisonError::into_inner) = abort;
    }

    pub(crate) fn abort_current(&self) {
        if let Some(abort) = self
            .current_abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            abort.abort();
        }
    }
}

/// Why the worker left its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Reload,
    Shutdown,
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    factory: Arc<dyn InterpreterFactory>,
    watcher: ChangeWatcher,
    config: ExecutorConfig,
    waker: Option<FsWaker>,
    /// Popped from the queue but not yet finished.
    in_flight: Option<Arc<Task>>,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        factory: Arc<dyn InterpreterFactory>,
        watcher: ChangeWatcher,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            shared,
            factory,
            watcher,
            config,
            waker: None,
            in_flight: None,
        }
    }

    /// Thread entry point. Returns only on shutdown.
    pub(crate) fn run(mut self) {
        loop {
            match catch_unwind(AssertUnwindSafe(|| self.run_states())) {
                Ok(()) => break,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(target: "hookwire::worker", "Worker loop panicked: {}; restarting", message);
                    self.fail_in_flight(&message);
                    self.shared.publish(Vec::new(), None);
                    self.shared.queue.set_lifecycle(Lifecycle::Stopped);
                    self.shared.queue.reject_all();
                    if matches!(self.shared.queue.wait_for_wake(self.config.retry_interval()), Next::Shutdown) {
                        break;
                    }
                }
            }
        }

        self.shared.publish(Vec::new(), None);
        self.shared.queue.set_lifecycle(Lifecycle::Stopped);
        tracing::info!(target: "hookwire::worker", "Worker stopped");
    }

    fn run_states(&mut self) {
        loop {
            if self.shared.queue.is_shutdown() {
                return;
            }

            self.shared.queue.set_lifecycle(Lifecycle::Starting);
            let spec = self.watcher.snapshot();
            self.refresh_waker(&spec);

            let exit = match self.start(&spec) {
                Ok(mut interpreter) => {
                    self.shared.queue.set_lifecycle(Lifecycle::Running);
                    let exit = self.serve(interpreter.as_mut());
                    self.teardown(interpreter);
                    exit
                }
                Err(e) => {
                    tracing::error!(target: "hookwire::worker", "Failed to start interpreter: {}", e);
                    self.shared.observer.on_startup_failed(&e);
                    self.degraded()
                }
            };

            if exit == Exit::Shutdown {
                return;
            }
        }
    }

    /// Build an interpreter for `spec` and publish its callables.
    fn start(&self, spec: &LoadSpec) -> crate::Result<Box<dyn Interpreter>> {
        tracing::info!(target: "hookwire::worker", "Starting interpreter for {}", spec.script.display());

        let context = ScriptContext::new(&spec.script);
        // Published before loading so shutdown can cut a slow load short.
        self.shared.publish(Vec::new(), Some(context.abort_handle()));
        if self.shared.queue.is_shutdown() {
            context.teardown();
        }

        let interpreter = match self.factory.create(spec, context.clone()) {
            Ok(interpreter) => interpreter,
            Err(e) => {
                context.teardown();
                return Err(e);
            }
        };

        let callables = interpreter.callables();
        let hooks = HookRegistry::from_callables(&callables);
        if self.config.require_hooks && hooks.is_empty() {
            context.teardown();
            return Err(Error::InterpreterStartup(format!(
                "{} defines no hook (expected one of `{}`, `{}`, or an editor hook such as `{}`)",
                spec.script.display(),
                HookKey::intercept(MessageKind::Request),
                HookKey::intercept(MessageKind::Response),
                HookKey::editor(MessageKind::Request, crate::hooks::Direction::In, None),
            )));
        }

        tracing::info!(
            target: "hookwire::worker",
            "Loaded {} ({} function(s), {} hook(s))",
            spec.script.display(),
            callables.len(),
            hooks.len()
        );
        self.shared.publish(callables, Some(context.abort_handle()));
        Ok(interpreter)
    }

    /// Dispatch tasks until a reload is due or the coordinator shuts down.
    fn serve(&mut self, interpreter: &mut dyn Interpreter) -> Exit {
        let poll = self.config.poll_interval();
        loop {
            if self.watcher.is_due() {
                tracing::info!(
                    target: "hookwire::worker",
                    "Reload due: {} changed",
                    self.watcher.changed_sources().join(", ")
                );
                // Everything queued so far belongs to this generation.
                for task in self.shared.queue.take_pending() {
                    self.dispatch(interpreter, &task);
                }
                return Exit::Reload;
            }

            match self.shared.queue.next_task(poll) {
                Next::Task(task) => self.dispatch(interpreter, &task),
                Next::Idle => {}
                Next::Shutdown => return Exit::Shutdown,
            }
        }
    }

    /// Reject tasks until the watched files change.
    fn degraded(&mut self) -> Exit {
        self.shared.publish(Vec::new(), None);
        self.shared.queue.set_lifecycle(Lifecycle::Stopped);
        loop {
            self.shared.queue.reject_all();
            if self.watcher.is_due() {
                tracing::info!(
                    target: "hookwire::worker",
                    "Retrying start: {} changed",
                    self.watcher.changed_sources().join(", ")
                );
                return Exit::Reload;
            }
            if matches!(self.shared.queue.wait_for_wake(self.config.retry_interval()), Next::Shutdown) {
                return Exit::Shutdown;
            }
        }
    }

    fn teardown(&self, interpreter: Box<dyn Interpreter>) {
        let context = interpreter.context().clone();
        self.shared.publish(Vec::new(), None);
        let handlers = context.teardown();
        drop(interpreter);
        tracing::info!(
            target: "hookwire::worker",
            "Tore down interpreter for {} ({} cleanup handler(s))",
            context.script().display(),
            handlers
        );
    }

    /// Run one task and finish it. Never unwinds.
    fn dispatch(&mut self, interpreter: &mut dyn Interpreter, task: &Arc<Task>) {
        if task.is_finished() {
            return;
        }
        self.in_flight = Some(task.clone());
        tracing::debug!(target: "hookwire::task", "Dispatching task {} ({})", task.id(), task.name());
        self.shared.observer.on_dispatched(task);

        let result = catch_unwind(AssertUnwindSafe(|| {
            interpreter.invoke(task.name(), task.args(), task.kwargs())
        }));

        let name = task.name();
        let (outcome, resolution) = match result {
            Ok(Ok(Some(value))) => (Outcome::Success(value), Resolution::Returned),
            Ok(Ok(None)) => (Outcome::Empty, Resolution::NoValue),
            Ok(Err(InvokeError::NotFound)) => {
                tracing::debug!(target: "hookwire::task", "Task {}: `{}` is not implemented", task.id(), name);
                (Outcome::Empty, Resolution::HookMissing)
            }
            Ok(Err(InvokeError::Raised(message))) => {
                (Outcome::Error(Error::script(name, message)), Resolution::Raised)
            }
            Ok(Err(InvokeError::Conversion(message))) => (
                Outcome::Error(Error::CastMismatch {
                    function: name.to_string(),
                    expected: "JSON value".to_string(),
                    message,
                }),
                Resolution::Raised,
            ),
            Err(panic) => (
                Outcome::Error(Error::script(
                    name,
                    format!("interpreter panicked: {}", panic_message(panic.as_ref())),
                )),
                Resolution::Raised,
            ),
        };

        if let Outcome::Error(e) = &outcome {
            tracing::warn!(target: "hookwire::task", "Task {} failed: {}", task.id(), e);
        } else {
            tracing::debug!(target: "hookwire::task", "Resolved task {} ({:?})", task.id(), resolution);
        }

        let finished = task.complete(outcome, resolution);
        self.in_flight = None;
        self.shared.queue.notify_finished();
        if finished {
            self.shared.observer.on_finished(task, resolution);
        }
    }

    /// Finish the task that was running when the loop panicked.
    fn fail_in_flight(&mut self, message: &str) {
        let Some(task) = self.in_flight.take() else {
            return;
        };
        let error = Error::script(task.name(), format!("worker panicked: {}", message));
        if task.complete(Outcome::Error(error), Resolution::Raised) {
            tracing::warn!(target: "hookwire::task", "Task {} failed: worker panicked", task.id());
        }
        self.shared.queue.notify_finished();
    }

    /// Re-watch the loaded files when their paths changed.
    fn refresh_waker(&mut self, spec: &LoadSpec) {
        if !self.config.watch_files {
            return;
        }
        let targets = [spec.script.as_path(), spec.framework.as_path()];
        let unchanged = self.waker.as_ref().is_some_and(|w| {
            w.targets()
                .iter()
                .map(|p| p.as_path())
                .eq(targets.iter().copied().filter(|p| !p.as_os_str().is_empty()))
        });
        if unchanged {
            return;
        }

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        match FsWaker::new(&targets, move || {
            if let Some(shared) = shared.upgrade() {
                shared.queue.wake();
            }
        }) {
            Ok(waker) => self.waker = Some(waker),
            Err(e) => {
                tracing::warn!(target: "hookwire::worker", "Filesystem watch unavailable, polling only: {}", e);
                self.waker = None;
            }
        }
    }
}
