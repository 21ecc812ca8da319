//! Error types for hookwire-core.

use thiserror::Error;

/// Result type for hookwire-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hookwire-core.
///
/// Errors are `Clone` because a finished task's outcome can be read by more
/// than one waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The task was not queued because the coordinator is disabled or stopped.
    #[error("task `{0}` not admitted: coordinator is disabled or not running")]
    AdmissionRejected(String),

    /// The framework or the user script failed to load.
    #[error("interpreter failed to start: {0}")]
    InterpreterStartup(String),

    /// The current script does not define the requested function.
    #[error("hook `{0}` is not implemented by the current script")]
    HookNotImplemented(String),

    /// The invoked function raised during execution.
    #[error("error in `{function}`: {message}")]
    ScriptRuntime { function: String, message: String },

    /// The script ran but returned a value of the wrong shape.
    #[error("`{function}` returned a value that is not a {expected}: {message}")]
    CastMismatch {
        function: String,
        expected: String,
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watcher could not be installed.
    #[error("file watch error: {0}")]
    Watch(String),

    /// The coordinator has been shut down.
    #[error("coordinator has shut down")]
    Shutdown,
}

impl Error {
    /// Script-side failure for `function`.
    pub fn script(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptRuntime {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Returns a recovery hint suitable for showing to an end user.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AdmissionRejected(_) => Some("enable the coordinator or fix the script so it can start"),
            Self::InterpreterStartup(_) => {
                Some("fix the script; it is reloaded automatically when the file changes")
            }
            Self::HookNotImplemented(_) => Some("define the hook function in your script"),
            Self::CastMismatch { .. } => Some("check the value returned by the hook"),
            _ => None,
        }
    }
}

/// Text of a panic payload, for logs and error messages.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
