//! Debounced task-list watcher.
//!
//! Optional, additive signal on top of the polling union read: watches the
//! task list's parent directory, and after each settle window re-parses the
//! file and reports the set of task ids newly checked off. Deletion or
//! rename of the file is a normal shutdown of the watcher; transient read
//! failures are skipped.

use crate::tasklist::completed_ids;
use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default settle window for filesystem events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Callback receiving the ids newly transitioned to completed.
pub type CompletionCallback = Box<dyn Fn(BTreeSet<String>) + Send>;

/// Handle over a running watcher. Dropping it closes the event channel and
/// the watch thread exits.
pub struct TaskListWatcher {
    // Owning the debouncer keeps the watch alive.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _thread: std::thread::JoinHandle<()>,
}

impl TaskListWatcher {
    /// Watch `task_list_path` and invoke `on_new_completions` with each
    /// batch of newly completed ids.
    pub fn spawn(
        task_list_path: &Path,
        on_new_completions: CompletionCallback,
        debounce: Duration,
    ) -> Result<Self> {
        let watch_dir = task_list_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        // Canonicalize so event paths (reported canonical by some backends)
        // compare equal to the target.
        let target: PathBuf = task_list_path
            .canonicalize()
            .unwrap_or_else(|_| task_list_path.to_path_buf());

        let (event_tx, event_rx) = mpsc::channel();
        let mut debouncer =
            new_debouncer(debounce, event_tx).context("Failed to create file watcher")?;
        debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

        let mut snapshot = std::fs::read_to_string(&target)
            .map(|contents| completed_ids(&contents))
            .unwrap_or_default();

        let handle = std::thread::Builder::new()
            .name("tasklist-watcher".to_string())
            .spawn(move || {
                while let Ok(result) = event_rx.recv() {
                    let events = match result {
                        Ok(events) => events,
                        Err(e) => {
                            warn!(error = %e, "file watch error");
                            continue;
                        }
                    };
                    if !events.iter().any(|event| event.path == target) {
                        continue;
                    }

                    let contents = match std::fs::read_to_string(&target) {
                        Ok(contents) => contents,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            info!(path = %target.display(), "task list removed; watcher stopping");
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "transient task list read failure");
                            continue;
                        }
                    };

                    let current = completed_ids(&contents);
                    let fresh: BTreeSet<String> =
                        current.difference(&snapshot).cloned().collect();
                    snapshot = current;
                    if !fresh.is_empty() {
                        on_new_completions(fresh);
                    }
                }
            })
            .context("Failed to spawn watcher thread")?;

        Ok(Self {
            _debouncer: debouncer,
            _thread: handle,
        })
    }
}
