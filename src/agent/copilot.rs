//! Copilot-style adapter.
//!
//! Writes the task context where Copilot-family assistants pick up repo
//! instructions, and prompts the operator to open the workspace in their
//! editor.

use crate::agent::{AgentAdapter, render_task_context};
use crate::tasklist::Task;
use anyhow::{Context, Result};
use async_trait::async_trait;
use console::style;
use std::path::{Path, PathBuf};
use tracing::info;

/// Adapter for editor assistants that read `.github/copilot-instructions.md`.
#[derive(Debug, Clone)]
pub struct CopilotAdapter {
    /// Task list path relative to the repository root.
    tasks_rel_path: PathBuf,
}

impl CopilotAdapter {
    pub fn new(tasks_rel_path: PathBuf) -> Self {
        Self { tasks_rel_path }
    }
}

#[async_trait]
impl AgentAdapter for CopilotAdapter {
    fn name(&self) -> &'static str {
        "copilot"
    }

    async fn setup_session(&self, workspace: &Path, task: &Task) -> Result<()> {
        let path = self.context_path(workspace);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let doc = render_task_context(task, &self.tasks_rel_path);
        tokio::fs::write(&path, doc)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(task = %task.id, path = %path.display(), "wrote session context");
        Ok(())
    }

    fn notify_user(&self, session_id: usize, workspace: &Path, task: &Task) {
        let abs = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        println!();
        println!(
            "{} session {} -> {} {}",
            style("►").cyan().bold(),
            session_id,
            style(&task.id).green().bold(),
            task.name
        );
        println!("  Open the workspace in your editor:");
        println!("    code {}", abs.display());
        println!(
            "  The task brief is in {} — ask Copilot to implement it.",
            self.context_path(Path::new(".")).display()
        );
        println!(
            "  Mark done via the checkbox in {} or: speckit-flow complete {}",
            self.tasks_rel_path.display(),
            task.id
        );
    }

    fn watch_paths(&self, workspace: &Path) -> Vec<PathBuf> {
        vec![workspace.join(&self.tasks_rel_path)]
    }

    fn context_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(".github").join("copilot-instructions.md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn setup_session_writes_context_file() {
        let dir = tempdir().unwrap();
        let adapter = CopilotAdapter::new(PathBuf::from("specs/001/tasks.md"));
        let task = Task::new("T001", "Bootstrap");

        adapter.setup_session(dir.path(), &task).await.unwrap();

        let path = adapter.context_path(dir.path());
        assert!(path.ends_with(".github/copilot-instructions.md"));
        let doc = std::fs::read_to_string(path).unwrap();
        assert!(doc.contains("T001"));
    }

    #[test]
    fn watch_paths_point_at_workspace_task_list() {
        let adapter = CopilotAdapter::new(PathBuf::from("specs/001/tasks.md"));
        let paths = adapter.watch_paths(Path::new("/repo/.worktrees-001/session-0-x"));
        assert_eq!(
            paths,
            vec![PathBuf::from(
                "/repo/.worktrees-001/session-0-x/specs/001/tasks.md"
            )]
        );
    }
}
