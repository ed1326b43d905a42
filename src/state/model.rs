//! The orchestration state document.
//!
//! One YAML document at `.speckit/flow-state.yaml` is the single durable
//! record of a run: which phase is active, what every session is doing, and
//! the status of every task. All mutation happens load -> modify -> save
//! through the [`StateStore`](crate::state::StateStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written into the state document.
pub const STATE_VERSION: &str = "1.0";

/// Runtime status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not started.
    #[default]
    Pending,
    /// A session is actively working on the task.
    InProgress,
    /// Task finished successfully. Terminal.
    Completed,
    /// Task failed. Terminal.
    Failed,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Status of one session workstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No task currently active.
    #[default]
    Idle,
    /// Working a task in the current phase.
    Executing,
    /// Blocked on other sessions finishing the phase.
    Waiting,
    /// All assigned tasks are done. Terminal.
    Completed,
    /// The session failed. Terminal.
    Failed,
}

/// Status of the final merge, absent until a merge starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    InProgress,
    Completed,
    Failed,
}

/// Runtime record for one task, keyed by task id in [`OrchestrationState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Assigned session index.
    pub session: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskState {
    /// A fresh pending record assigned to `session`.
    pub fn pending(session: usize) -> Self {
        Self {
            status: TaskStatus::Pending,
            session,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Runtime record for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    /// Index in `[0, num_sessions)`.
    pub session_id: usize,
    /// Workspace path relative to the repository root.
    pub worktree_path: String,
    /// `impl-{spec_id}-session-{session_id}`.
    pub branch_name: String,
    /// Task currently being worked, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// Tasks this session has finished, in completion order.
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    pub status: SessionStatus,
}

/// The single persisted orchestration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestrationState {
    pub version: String,
    pub spec_id: String,
    pub agent_type: String,
    pub num_sessions: usize,
    /// Branch that integration is measured against.
    pub base_branch: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `phase-{i}` currently executing (or about to execute).
    pub current_phase: String,
    /// Completed phase names, a prefix of the plan's phase order.
    #[serde(default)]
    pub phases_completed: Vec<String>,
    #[serde(default)]
    pub sessions: Vec<SessionState>,
    /// Task id -> runtime state.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<MergeStatus>,
}

impl OrchestrationState {
    /// Create a fresh document for a new run.
    pub fn new(spec_id: &str, agent_type: &str, num_sessions: usize, base_branch: &str) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION.to_string(),
            spec_id: spec_id.to_string(),
            agent_type: agent_type.to_string(),
            num_sessions,
            base_branch: base_branch.to_string(),
            started_at: now,
            updated_at: now,
            current_phase: crate::dag::phase_name(0),
            phases_completed: Vec::new(),
            sessions: Vec::new(),
            tasks: BTreeMap::new(),
            merge_status: None,
        }
    }

    /// Refresh `updated_at`. Every mutator calls this before saving.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mutable session record by id.
    pub fn session_mut(&mut self, session_id: usize) -> Option<&mut SessionState> {
        self.sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
    }

    /// Session record by id.
    pub fn session(&self, session_id: usize) -> Option<&SessionState> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Count of tasks with the given status.
    pub fn count_tasks(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Check if every task reached `completed`.
    pub fn all_tasks_completed(&self) -> bool {
        self.tasks
            .values()
            .all(|t| t.status == TaskStatus::Completed)
    }

    /// Ids of tasks assigned to `session_id` still shy of completion.
    pub fn remaining_tasks_for(&self, session_id: usize) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.session == session_id && !t.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }
}
