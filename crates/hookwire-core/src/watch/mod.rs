//! Change detection for the loaded files.
//!
//! Polling ([`ChangeWatcher`]) decides when a reload is due. The optional
//! [`FsWaker`] only shortens the wait by waking the worker early.

mod change;
mod events;

pub use change::ChangeWatcher;
pub use events::FsWaker;
