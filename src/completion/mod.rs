//! Unified "is task T complete?" signal.
//!
//! Two independent sources feed the signal: sentinel files written by the
//! explicit `complete` command, and checkbox transitions in the feature's
//! task list. The detector reads their union; the watcher streams checkbox
//! transitions for consumers that want push-style updates.

mod detector;
mod watcher;

pub use detector::{CompletionDetector, DEFAULT_POLL_INTERVAL};
pub use watcher::{CompletionCallback, DEFAULT_DEBOUNCE, TaskListWatcher};
