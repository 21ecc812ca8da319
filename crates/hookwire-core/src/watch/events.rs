//! Filesystem notifications that wake the worker early.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer, notify::RecursiveMode};

use crate::error::{Error, Result};

/// Watches the directories of the loaded files and runs a callback when one
/// of the files changes.
pub struct FsWaker {
    /// Debouncer handle (kept alive to maintain the watcher).
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    targets: Vec<PathBuf>,
}

impl FsWaker {
    /// Watch `targets`; empty paths are ignored.
    pub fn new(targets: &[&Path], on_change: impl Fn() + Send + 'static) -> Result<Self> {
        let targets: Vec<PathBuf> = targets
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .collect();
        let matched = targets.clone();

        let mut debouncer = new_debouncer(Duration::from_millis(100), move |result: DebounceEventResult| {
            let Ok(events) = result else {
                return;
            };
            if events.iter().any(|event| is_target(&matched, &event.path)) {
                on_change();
            }
        })
        .map_err(|e| Error::Watch(e.to_string()))?;

        let mut dirs: Vec<&Path> = targets
            .iter()
            .map(|p| p.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new(".")))
            .collect();
        dirs.sort();
        dirs.dedup();

        for dir in dirs {
            debouncer
                .watcher()
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::Watch(format!("{}: {}", dir.display(), e)))?;
        }

        Ok(Self {
            _debouncer: debouncer,
            targets,
        })
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }
}

// Event paths may be canonical while targets are not, so fall back to
// comparing file names.
fn is_target(targets: &[PathBuf], path: &Path) -> bool {
    targets
        .iter()
        .any(|t| t == path || (t.file_name().is_some() && t.file_name() == path.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn test_is_target() {
        let targets = vec![PathBuf::from("dir/script.rhai")];
        assert!(is_target(&targets, Path::new("/abs/dir/script.rhai")));
        assert!(!is_target(&targets, Path::new("/abs/dir/other.rhai")));
    }

    #[test]
    fn test_waker_creation_skips_empty_paths() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("script.rhai");
        fs::write(&script, "").unwrap();

        let waker = FsWaker::new(&[script.as_path(), Path::new("")], || {}).unwrap();
        assert_eq!(waker.targets(), &[script]);
    }

    #[test]
    fn test_waker_fires_on_write() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("script.rhai");
        fs::write(&script, "").unwrap();

        let (tx, rx) = mpsc::channel();
        let _waker = FsWaker::new(&[script.as_path()], move || {
            let _ = tx.send(());
        })
        .unwrap();

        fs::write(&script, "fn request(r) { r }").unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(10)).is_ok());
    }
}
