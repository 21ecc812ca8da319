//! Coordinator lifecycle status.

use std::fmt;

use serde::Serialize;

/// Lifecycle of the interpreter-owning worker.
///
/// `Starting` covers both the first start and every reload; tasks submitted
/// while starting are queued and wait. `Stopped` is entered when the script
/// cannot be loaded (until it changes) and, terminally, on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Starting,
    Running,
    Stopped,
}

impl Lifecycle {
    /// Whether a task queued now will eventually be dispatched.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Lifecycle state plus the host-controlled admission flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub lifecycle: Lifecycle,
    pub enabled: bool,
}

impl Status {
    /// Whether new tasks are admitted.
    pub fn accepts_tasks(&self) -> bool {
        self.enabled && self.lifecycle.is_live()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.lifecycle,
            if self.enabled { "enabled" } else { "disabled" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_tasks() {
        let mut status = Status {
            lifecycle: Lifecycle::Starting,
            enabled: true,
        };
        assert!(status.accepts_tasks());

        status.enabled = false;
        assert!(!status.accepts_tasks());

        status.enabled = true;
        status.lifecycle = Lifecycle::Stopped;
        assert!(!status.accepts_tasks());
    }

    #[test]
    fn test_display() {
        let status = Status {
            lifecycle: Lifecycle::Running,
            enabled: false,
        };
        assert_eq!(status.to_string(), "running (disabled)");
    }
}
