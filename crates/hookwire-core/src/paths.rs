//! Data directory management.
//!
//! Provides the on-disk layout shared by every host that embeds the
//! coordinator, so the framework and per-workspace files always live in the
//! same place.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory structure of the hookwire data directory.
///
/// ```text
/// <root>/
/// ├── framework/          # Bundled framework script
/// └── workspaces/
///     └── <name>/         # One directory per workspace (scripts, env)
/// ```
#[derive(Debug, Clone)]
pub struct HookwireDirs {
    /// The data directory itself.
    pub root: PathBuf,

    /// Directory holding the installed framework file.
    pub framework_dir: PathBuf,

    /// Parent of every workspace directory.
    pub workspaces_dir: PathBuf,
}

impl HookwireDirs {
    /// Layout under the user's data directory (e.g. `~/.local/share/hookwire`).
    ///
    /// # Errors
    /// Returns an error if the platform has no data directory or directory
    /// creation fails.
    pub fn from_user_data_dir() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| Error::Config("no user data directory on this platform".into()))?;
        Self::from_root(&base.join("hookwire"))
    }

    /// Layout under an explicit root.
    ///
    /// Creates all necessary directories if they don't exist.
    pub fn from_root(root: &Path) -> Result<Self> {
        let framework_dir = root.join("framework");
        let workspaces_dir = root.join("workspaces");

        fs::create_dir_all(&framework_dir)?;
        fs::create_dir_all(&workspaces_dir)?;

        Ok(Self {
            root: root.to_path_buf(),
            framework_dir,
            workspaces_dir,
        })
    }

    /// Directory of the workspace `name`, created on demand.
    pub fn workspace(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Config(format!("invalid workspace name `{}`", name)));
        }
        let dir = self.workspaces_dir.join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Install `contents` as the framework file `file_name`.
    ///
    /// The file is only rewritten when it is missing or its contents differ,
    /// so its modification time (and therefore the coordinator's reload
    /// detection) is left alone when nothing changed.
    pub fn ensure_framework(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.framework_dir.join(file_name);
        let current = fs::read_to_string(&path).ok();
        if current.as_deref() != Some(contents) {
            tracing::info!(target: "hookwire::worker", "Installing framework to {}", path.display());
            fs::write(&path, contents)?;
        }
        Ok(path)
    }
}
