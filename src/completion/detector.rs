//! Dual-source completion detection.
//!
//! A task counts as complete when either source says so:
//!
//! - a sentinel file `.speckit/completions/{T###}.done` exists (written by
//!   the `complete` command), or
//! - its checkbox in the feature's task list is closed.
//!
//! The union read is the authoritative signal; the filesystem watcher is
//! additive. Sentinels are write-once: the first creator wins and re-marking
//! is a no-op.

use crate::errors::CompletionError;
use crate::interrupt::CancelToken;
use crate::tasklist::{completed_ids, is_valid_task_id};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between completion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Reader/writer for the union completion signal.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    completions_dir: PathBuf,
}

impl CompletionDetector {
    /// Create a detector over the sentinel directory.
    pub fn new(completions_dir: PathBuf) -> Self {
        Self { completions_dir }
    }

    /// Path of the sentinel file for `task_id`.
    pub fn sentinel_path(&self, task_id: &str) -> PathBuf {
        self.completions_dir.join(format!("{}.done", task_id))
    }

    /// Create the sentinel for `task_id`. Idempotent; returns `false` when
    /// the sentinel already existed.
    pub fn mark_complete(&self, task_id: &str) -> Result<bool> {
        fs::create_dir_all(&self.completions_dir)
            .with_context(|| format!("Failed to create {}", self.completions_dir.display()))?;
        let path = self.sentinel_path(task_id);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to create {}", path.display())),
        }
    }

    /// Task ids with sentinel files present.
    pub fn manual_completions(&self) -> BTreeSet<String> {
        let Ok(entries) = fs::read_dir(&self.completions_dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = name.strip_suffix(".done")?;
                is_valid_task_id(id).then(|| id.to_string())
            })
            .collect()
    }

    /// Union of sentinel completions and checked boxes in the task list.
    ///
    /// An absent or unreadable task list degrades silently to sentinels
    /// alone; the human may not have created it yet.
    pub fn get_completed(&self, task_list_path: Option<&Path>) -> BTreeSet<String> {
        let mut completed = self.manual_completions();
        if let Some(path) = task_list_path
            && let Ok(contents) = fs::read_to_string(path)
        {
            completed.extend(completed_ids(&contents));
        }
        completed
    }

    /// Block until every id in `task_ids` is complete.
    ///
    /// Polls the union signal every `poll_interval`, observing `cancel`
    /// between polls so an interrupt stops the wait promptly. Returns the
    /// requested set on success; a lapsed `timeout` yields
    /// [`CompletionError::Timeout`] carrying the pending/completed partition.
    pub async fn wait_for_completion(
        &self,
        task_ids: &BTreeSet<String>,
        task_list_path: Option<&Path>,
        timeout: Option<Duration>,
        poll_interval: Duration,
        cancel: &CancelToken,
    ) -> Result<BTreeSet<String>, CompletionError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if cancel.is_set() {
                return Err(CompletionError::Interrupted);
            }

            let completed = self.get_completed(task_list_path);
            if task_ids.is_subset(&completed) {
                return Ok(task_ids.clone());
            }

            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                let done: Vec<String> = task_ids.intersection(&completed).cloned().collect();
                let pending: Vec<String> = task_ids.difference(&completed).cloned().collect();
                return Err(CompletionError::Timeout {
                    pending,
                    completed: done,
                });
            }

            debug!(
                waiting = task_ids.difference(&completed).count(),
                "tasks still pending"
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}
