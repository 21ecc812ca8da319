//! Modification-time polling.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::ConfigSource;
use crate::interpreter::LoadSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    path: PathBuf,
    /// `None` when the file is missing or unreadable.
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: PathBuf) -> Self {
        let modified = modified_time(&path);
        Self { path, modified }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    if path.as_os_str().is_empty() {
        return None;
    }
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    script: Fingerprint,
    framework: Fingerprint,
    version: u64,
}

/// Tracks the script, the framework and the configuration version.
///
/// A reload is due when any of the three differs from the last snapshot,
/// including a changed path. Before the first snapshot a reload is always
/// due.
pub struct ChangeWatcher {
    source: Arc<dyn ConfigSource>,
    last: Option<Observation>,
}

impl ChangeWatcher {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source, last: None }
    }

    fn observe(&self) -> (Observation, PathBuf) {
        let settings = self.source.current();
        let observation = Observation {
            script: Fingerprint::of(settings.script),
            framework: Fingerprint::of(settings.framework),
            version: settings.version,
        };
        (observation, settings.environment)
    }

    pub fn is_due(&self) -> bool {
        match &self.last {
            None => true,
            Some(last) => *last != self.observe().0,
        }
    }

    /// Which tracked sources differ from the last snapshot, for logging.
    pub fn changed_sources(&self) -> Vec<&'static str> {
        let Some(last) = &self.last else {
            return vec!["initial load"];
        };
        let (now, _) = self.observe();
        let mut changed = Vec::new();
        if now.script != last.script {
            changed.push("script");
        }
        if now.framework != last.framework {
            changed.push("framework");
        }
        if now.version != last.version {
            changed.push("config");
        }
        changed
    }

    /// Record the current state of all three sources at once and return the
    /// files that state refers to.
    pub fn snapshot(&mut self) -> LoadSpec {
        let (observation, environment) = self.observe();
        let spec = LoadSpec {
            script: observation.script.path.clone(),
            framework: observation.framework.path.clone(),
            environment,
        };
        self.last = Some(observation);
        spec
    }
}
