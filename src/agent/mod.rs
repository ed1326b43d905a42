//! Agent adapter interface.
//!
//! The orchestration core is agnostic to which external coding assistant a
//! developer drives; the adapter is the whole seam. It materializes a
//! per-workspace context document, tells the operator what to open and run,
//! and declares which files signal completion. An adapter that only logs is
//! valid.

mod copilot;
mod manual;

pub use copilot::CopilotAdapter;
pub use manual::ManualAdapter;

use crate::tasklist::Task;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// The narrow interface the coordinator drives per session.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// The adapter's configured name.
    fn name(&self) -> &'static str;

    /// Write the context document for `task` into the workspace, at
    /// [`context_path`](Self::context_path).
    async fn setup_session(&self, workspace: &Path, task: &Task) -> Result<()>;

    /// Prompt the operator: which workspace to open, what to do there.
    /// Rendered paths must be absolute and copy-pasteable.
    fn notify_user(&self, session_id: usize, workspace: &Path, task: &Task);

    /// Files whose mutations indicate task completion.
    fn watch_paths(&self, workspace: &Path) -> Vec<PathBuf>;

    /// Where [`setup_session`](Self::setup_session) writes the context
    /// document, relative to the workspace.
    fn context_path(&self, workspace: &Path) -> PathBuf;
}

/// Select an adapter by configured name.
///
/// `tasks_rel_path` is the task list's path relative to the repository root,
/// used both inside context documents and for watch paths. Unrecognized
/// names degrade to the manual adapter.
pub fn adapter_for(agent_type: &str, tasks_rel_path: PathBuf) -> Arc<dyn AgentAdapter> {
    match agent_type {
        "copilot" => Arc::new(CopilotAdapter::new(tasks_rel_path)),
        "manual" => Arc::new(ManualAdapter::new(tasks_rel_path)),
        other => {
            warn!(agent_type = other, "unknown agent_type, using manual adapter");
            Arc::new(ManualAdapter::new(tasks_rel_path))
        }
    }
}

/// Shared context-document body describing a task to an assistant.
pub(crate) fn render_task_context(task: &Task, tasks_rel_path: &Path) -> String {
    let mut doc = String::new();
    doc.push_str(&format!("# Task {}: {}\n\n", task.id, task.name));
    doc.push_str("You are implementing one task of a larger feature inside an isolated\n");
    doc.push_str("worktree. Work only within this checkout.\n\n");

    if let Some(story) = &task.story {
        doc.push_str(&format!("Story: {}\n\n", story));
    }
    if !task.dependencies.is_empty() {
        doc.push_str(&format!(
            "Completed prerequisites: {}\n\n",
            task.dependencies.join(", ")
        ));
    }
    if !task.files.is_empty() {
        doc.push_str("Files this task is expected to touch:\n");
        for file in &task.files {
            doc.push_str(&format!("- `{}`\n", file));
        }
        doc.push('\n');
    }

    doc.push_str("When the task is done, either:\n");
    doc.push_str(&format!(
        "- check its box in `{}`, or\n",
        tasks_rel_path.display()
    ));
    doc.push_str(&format!(
        "- run `speckit-flow complete {}` from the main checkout.\n",
        task.id
    ));
    doc
}
