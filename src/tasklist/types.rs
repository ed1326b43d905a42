//! Task types shared by ingestion, the DAG engine, and the completion
//! detector.

use serde::{Deserialize, Serialize};

/// A single implementation task from the feature's task list.
///
/// Immutable input data: runtime status lives in the orchestration state,
/// keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique short identifier, `T` plus exactly three digits.
    pub id: String,
    /// Human-readable label (the line's description).
    pub name: String,
    /// Ids of tasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// May this task run concurrently with its phase-mates?
    #[serde(default)]
    pub parallelizable: bool,
    /// Optional story grouping tag, e.g. `US2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    /// Paths the task is expected to touch (advisory, harvested from the
    /// description).
    #[serde(default)]
    pub files: Vec<String>,
    /// Whether the source line is already checked off.
    #[serde(default)]
    pub completed: bool,
    /// Assigned session index; populated by the DAG engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<usize>,
}

impl Task {
    /// Create a task with the given id and name and no other attributes.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            dependencies: Vec::new(),
            parallelizable: false,
            story: None,
            files: Vec::new(),
            completed: false,
            session: None,
        }
    }

    /// Add dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Mark the task parallelizable.
    pub fn parallel(mut self) -> Self {
        self.parallelizable = true;
        self
    }

    /// Check if this task has any dependencies.
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Check whether `id` is a well-formed task id (`T` + three digits).
pub fn is_valid_task_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 4 && bytes[0] == b'T' && bytes[1..].iter().all(u8::is_ascii_digit)
}
