//! Configuration consumed by the coordinator.
//!
//! Two kinds of configuration flow in at construction time:
//! - a [`ConfigSource`], polled continuously, that says which files to load
//!   and whether the host wants script calls at all;
//! - an [`ExecutorConfig`] with the coordinator's own timing knobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One consistent reading of a [`ConfigSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub script: PathBuf,
    pub framework: PathBuf,
    pub environment: PathBuf,
    pub version: u64,
}

/// Host-side settings polled by the coordinator.
///
/// Implementations must be cheap to call; the worker reads them on each
/// poll tick.
pub trait ConfigSource: Send + Sync {
    /// The user script to load.
    fn user_script_path(&self) -> PathBuf;

    /// The framework file loaded before the user script.
    fn framework_path(&self) -> PathBuf;

    /// The environment directory exposed to the script.
    fn environment_path(&self) -> PathBuf;

    /// Counter that advances whenever any other setting changes.
    fn config_version(&self) -> u64;

    /// Initial admission state.
    fn is_enabled(&self) -> bool;

    /// Paths and version read together.
    ///
    /// The default reads each method in turn. Sources whose settings can
    /// change concurrently should override it so the version always matches
    /// the paths it is returned with.
    fn current(&self) -> HostSettings {
        HostSettings {
            script: self.user_script_path(),
            framework: self.framework_path(),
            environment: self.environment_path(),
            version: self.config_version(),
        }
    }
}

/// Thread-safe in-memory [`ConfigSource`].
///
/// Every setter bumps the configuration version, which the coordinator
/// treats as "reload due".
#[derive(Debug)]
pub struct HostConfig {
    /// Paths and version change together under this lock.
    settings: RwLock<HostSettings>,
    enabled: AtomicBool,
}

impl HostConfig {
    pub fn new(script: impl Into<PathBuf>, framework: impl Into<PathBuf>) -> Self {
        Self {
            settings: RwLock::new(HostSettings {
                script: script.into(),
                framework: framework.into(),
                environment: PathBuf::new(),
                version: 0,
            }),
            enabled: AtomicBool::new(true),
        }
    }

    /// Set the environment directory.
    pub fn with_environment(self, environment: impl Into<PathBuf>) -> Self {
        self.update(|p| p.environment = environment.into());
        self
    }

    /// Set the initial admission state.
    pub fn with_enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn set_user_script_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.update(|p| p.script = path);
    }

    pub fn set_framework_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.update(|p| p.framework = path);
    }

    pub fn set_environment_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.update(|p| p.environment = path);
    }

    /// Advance the version without changing anything, forcing a reload.
    pub fn bump_version(&self) -> u64 {
        self.update(|_| {})
    }

    /// Apply `f` and advance the version in one write.
    pub fn update(&self, f: impl FnOnce(&mut HostSettings)) -> u64 {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *settings);
        settings.version += 1;
        settings.version
    }

    fn read(&self) -> RwLockReadGuard<'_, HostSettings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigSource for HostConfig {
    fn user_script_path(&self) -> PathBuf {
        self.read().script.clone()
    }

    fn framework_path(&self) -> PathBuf {
        self.read().framework.clone()
    }

    fn environment_path(&self) -> PathBuf {
        self.read().environment.clone()
    }

    fn config_version(&self) -> u64 {
        self.read().version
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn current(&self) -> HostSettings {
        self.read().clone()
    }
}

/// Timing and policy knobs of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bounded-wait slice for callers and the worker, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a caller waits before logging that its task is stalled.
    pub warn_after_ms: u64,
    /// Pause between sweeps while the interpreter cannot start.
    pub retry_interval_ms: u64,
    /// Refuse to start a script that defines no recognized hook.
    pub require_hooks: bool,
    /// Install a filesystem watcher that wakes the worker on change.
    pub watch_files: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            warn_after_ms: 1000,
            retry_interval_ms: 100,
            require_hooks: true,
            watch_files: false,
        }
    }
}

impl ExecutorConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the bounded waits degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(Error::Config("retry_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn warn_after(&self) -> Duration {
        Duration::from_millis(self.warn_after_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}
