//! Coordinator setup shared by every command.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use hookwire_core::{
    Coordinator, Error, ExecutorConfig, HookwireDirs, HostConfig, Lifecycle, LoadSpec,
    RhaiFactory, TaskObserver,
};

use crate::host::CliHost;

const PRELUDE: &str = include_str!("../framework/prelude.rhai");
const PRELUDE_FILE: &str = "prelude.rhai";

/// Options common to every command.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub framework: Option<PathBuf>,
    pub env: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub allow_missing_hooks: bool,
}

/// Remembers the last startup failure so commands can report it.
#[derive(Default)]
struct StartupErrors(Mutex<Option<Error>>);

impl TaskObserver for StartupErrors {
    fn on_startup_failed(&self, error: &Error) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
    }
}

/// A running coordinator for one script.
pub struct Session {
    pub coordinator: Arc<Coordinator>,
    pub host_config: Arc<HostConfig>,
    startup: Arc<StartupErrors>,
}

impl Session {
    /// Start a coordinator for `script`. `adjust` may tweak the executor
    /// settings after the config file (if any) is applied.
    pub fn open(script: &str, options: &Options, adjust: impl FnOnce(&mut ExecutorConfig)) -> anyhow::Result<Self> {
        let spec = load_spec(script, options)?;

        let mut config = match &options.config {
            Some(file) => ExecutorConfig::from_file(file)?,
            None => ExecutorConfig::default(),
        };
        if options.allow_missing_hooks {
            config.require_hooks = false;
        }
        adjust(&mut config);

        let mut host_config = HostConfig::new(spec.script, spec.framework);
        if let Some(env) = &options.env {
            host_config = host_config.with_environment(env);
        }
        let host_config = Arc::new(host_config);

        let startup = Arc::new(StartupErrors::default());
        let factory = Arc::new(RhaiFactory::new().with_host(Arc::new(CliHost)));
        let coordinator = Coordinator::with_observer(host_config.clone(), factory, config, startup.clone())?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            host_config,
            startup,
        })
    }

    /// Wait for the first start to finish, failing if the script could not
    /// be loaded.
    pub fn wait_started(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.coordinator.status().lifecycle {
                Lifecycle::Running => return Ok(()),
                Lifecycle::Stopped => {
                    return Err(self
                        .startup_error()
                        .map(anyhow::Error::from)
                        .unwrap_or_else(|| anyhow::anyhow!("Script failed to start")));
                }
                Lifecycle::Starting if Instant::now() >= deadline => {
                    anyhow::bail!("Timed out waiting for the script to load");
                }
                Lifecycle::Starting => thread::sleep(Duration::from_millis(10)),
            }
        }
    }

    pub fn startup_error(&self) -> Option<Error> {
        self.startup.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Resolve the files to load for `script`: the canonical script path, the
/// framework (the bundled prelude unless overridden) and the environment.
pub fn load_spec(script: &str, options: &Options) -> anyhow::Result<LoadSpec> {
    let path = Path::new(script);
    if !path.exists() {
        anyhow::bail!("Script not found: {}", script);
    }
    let script = path.canonicalize()?;

    let framework = match &options.framework {
        Some(framework) => framework.clone(),
        None => install_prelude(options.data_dir.as_deref())?,
    };
    tracing::debug!("Using framework {}", framework.display());

    Ok(LoadSpec {
        script,
        framework,
        environment: options.env.clone().unwrap_or_default(),
    })
}

/// Install the bundled prelude in the data directory and return its path.
fn install_prelude(data_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dirs = match data_dir {
        Some(root) => HookwireDirs::from_root(root)?,
        None => HookwireDirs::from_user_data_dir()?,
    };
    Ok(dirs.ensure_framework(PRELUDE_FILE, PRELUDE)?)
}
