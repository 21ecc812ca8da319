//! Cancellation and cleanup for one interpreter generation.
//!
//! Each interpreter is created with a [`ScriptContext`]. Host code that does
//! work on the script's behalf (background threads, open handles) keeps a
//! clone, polls [`ScriptContext::is_cancelled`] and registers cleanup
//! handlers. When the interpreter is torn down the context is aborted and
//! the handlers run. Code that ignores the signal keeps running until the
//! process exits; nothing is force-killed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle for cooperative cancellation.
///
/// Cheap to clone; aborting any clone is visible to all of them.
///
/// ```
/// use hookwire_core::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let other = handle.clone();
/// other.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }
}

type CleanupHandler = Box<dyn FnOnce() + Send>;

struct ContextInner {
    script: PathBuf,
    abort: AbortHandle,
    torn_down: AtomicBool,
    cleanup_handlers: Mutex<Vec<CleanupHandler>>,
}

impl ContextInner {
    fn run_cleanup(&self) -> usize {
        let handlers = std::mem::take(
            &mut *self
                .cleanup_handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = handlers.len();

        // LIFO, and a panicking handler must not stop the others.
        for handler in handlers.into_iter().rev() {
            if let Err(e) = catch_unwind(AssertUnwindSafe(handler)) {
                tracing::error!(
                    target: "hookwire::worker",
                    "Cleanup handler for {} panicked: {:?}",
                    self.script.display(),
                    e
                );
            }
        }
        count
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

/// Shared context of one interpreter generation.
#[derive(Clone)]
pub struct ScriptContext {
    inner: Arc<ContextInner>,
}

impl ScriptContext {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                script: script.into(),
                abort: AbortHandle::new(),
                torn_down: AtomicBool::new(false),
                cleanup_handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The script this generation loaded.
    pub fn script(&self) -> &Path {
        &self.inner.script
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.inner.abort.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.abort.is_aborted()
    }

    /// Register a handler to run at teardown. Handlers run in reverse order
    /// of registration; one registered after teardown runs immediately.
    pub fn on_cleanup(&self, handler: impl FnOnce() + Send + 'static) {
        {
            let mut handlers = self
                .inner
                .cleanup_handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.inner.torn_down.load(Ordering::SeqCst) {
                handlers.push(Box::new(handler));
                return;
            }
        }
        if let Err(e) = catch_unwind(AssertUnwindSafe(handler)) {
            tracing::error!(target: "hookwire::worker", "Late cleanup handler panicked: {:?}", e);
        }
    }

    /// Abort and run every cleanup handler. Only the first call does work;
    /// returns the number of handlers run.
    pub fn teardown(&self) -> usize {
        self.inner.abort.abort();
        {
            // Flip under the handler lock so on_cleanup cannot slip a
            // handler in after the sweep.
            let _handlers = self
                .inner
                .cleanup_handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.torn_down.swap(true, Ordering::SeqCst) {
                return 0;
            }
        }
        self.inner.run_cleanup()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptContext")
            .field("script", &self.inner.script)
            .field("cancelled", &self.is_cancelled())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
