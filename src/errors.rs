//! Typed error hierarchy for the flow orchestrator.
//!
//! Four top-level enums cover the four subsystems:
//! - `DagError` — graph construction and lookup failures
//! - `StateError` — durable state load/save/lock failures
//! - `WorkspaceError` — worktree and branch lifecycle failures
//! - `CompletionError` — completion-wait failures and interrupts

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the DAG engine.
#[derive(Debug, Error)]
pub enum DagError {
    #[error("Cycle detected in task dependencies: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Duplicate task id: {id}")]
    DuplicateTask { id: String },

    #[error("Unknown task id: {id}")]
    UnknownTask { id: String },

    #[error("Phase index {index} out of range (plan has {count} phases)")]
    PhaseOutOfRange { index: usize, count: usize },
}

impl DagError {
    /// The cycle path, when this error is a cycle.
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            Self::Cycle { path } => Some(path),
            _ => None,
        }
    }
}

/// Errors from the state store and checkpoint store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("No orchestration state found at {path}")]
    NotFound { path: PathBuf },

    #[error("Orchestration state at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Timed out after {waited_ms}ms waiting for lock at {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("State I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the workspace manager.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace already exists: {path} (branch {branch})")]
    Exists { path: PathBuf, branch: String },

    #[error("Workspace at {path} has uncommitted changes; pass force to remove it")]
    Dirty { path: PathBuf },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors from the completion detector.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(
        "Timed out waiting for tasks. Pending: [{}]. Completed: [{}]",
        pending.join(", "),
        completed.join(", ")
    )]
    Timeout {
        pending: Vec<String>,
        completed: Vec<String>,
    },

    #[error("Interrupted while waiting for task completion")]
    Interrupted,
}
