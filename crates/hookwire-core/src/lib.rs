//! Script execution coordinator for an HTTP proxy host.
//!
//! This crate provides:
//! - A tri-state [`Outcome`] for every script call
//! - A FIFO task queue shared by any number of caller threads
//! - A single worker thread that owns the interpreter and runs tasks in order
//! - Hot reload when the script, framework or configuration changes
//! - A Rhai embedding behind the [`InterpreterFactory`] trait

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hooks;
pub mod interpreter;
pub mod outcome;
pub mod paths;
pub mod queue;
pub mod status;
pub mod task;
pub mod watch;

pub use config::{ConfigSource, ExecutorConfig, HostConfig, HostSettings};
pub use coordinator::{Coordinator, NoopObserver, TaskHandle, TaskObserver};
pub use error::{Error, Result};
pub use hooks::{Direction, EditorTab, HookKey, HookRegistry, MessageKind, is_hook_name};
pub use interpreter::{
    AbortHandle, CapturedOutput, Callable, HostCapability, Interpreter, InterpreterFactory,
    InvokeError, LoadSpec, RhaiFactory, ScriptContext,
};
pub use outcome::Outcome;
pub use paths::HookwireDirs;
pub use queue::TaskQueue;
pub use status::{Lifecycle, Status};
pub use task::{Kwargs, Resolution, Task, TaskId};
pub use watch::{ChangeWatcher, FsWaker};
