//! The interpreter boundary.
//!
//! The coordinator only ever sees an interpreter through two traits:
//! [`InterpreterFactory`], shared across threads, which builds a fresh
//! [`Interpreter`] on the worker thread; and the interpreter itself, which
//! can invoke a named function and list what it defines. Values crossing the
//! boundary are JSON values.
//!
//! # Module Structure
//!
//! - `context` - Cooperative cancellation and teardown handlers
//! - `rhai_engine` - The shipped Rhai embedding

mod context;
mod rhai_engine;

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::task::Kwargs;

pub use context::{AbortHandle, ScriptContext};
pub use rhai_engine::RhaiFactory;

/// Files one interpreter generation is built from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadSpec {
    pub script: PathBuf,
    /// Loaded before the script; an empty path means no framework.
    pub framework: PathBuf,
    pub environment: PathBuf,
}

/// A function defined by the loaded script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Callable {
    pub name: String,
    pub params: Vec<String>,
}

/// Why an invocation produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// No function with this name exists.
    NotFound,
    /// The function (or argument binding) failed.
    Raised(String),
    /// The function returned a value that has no JSON form.
    Conversion(String),
}

/// Output captured from an ad-hoc evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Object exposed to scripts through `host(method, args)`.
///
/// Implementations run on the worker thread, in the middle of a script call.
/// Anything they start in the background should watch `context`.
pub trait HostCapability: Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>, context: &ScriptContext) -> std::result::Result<Value, String>;
}

/// A loaded script, owned by the worker thread.
pub trait Interpreter {
    /// Call `name`. `Ok(None)` means the function ran and returned nothing.
    fn invoke(&mut self, name: &str, args: &[Value], kwargs: &Kwargs) -> std::result::Result<Option<Value>, InvokeError>;

    /// Public functions of the loaded script.
    fn callables(&self) -> Vec<Callable>;

    fn context(&self) -> &ScriptContext;
}

/// Builds interpreters. Shared between the worker and callers.
pub trait InterpreterFactory: Send + Sync {
    /// Load the framework and script described by `spec`.
    ///
    /// # Errors
    /// Returns `Error::InterpreterStartup` if anything fails to load.
    fn create(&self, spec: &LoadSpec, context: ScriptContext) -> Result<Box<dyn Interpreter>>;

    /// Evaluate `code` in a fresh interpreter with `spec` loaded, capturing
    /// what it prints. Load and evaluation errors end up in `stderr`.
    fn evaluate(&self, spec: &LoadSpec, code: &str) -> CapturedOutput;
}
