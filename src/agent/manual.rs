//! Manual adapter: context file plus log-only prompts.
//!
//! The fallback for unrecognized `agent_type` values and for operators who
//! drive sessions without any assistant integration.

use crate::agent::{AgentAdapter, render_task_context};
use crate::tasklist::Task;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ManualAdapter {
    tasks_rel_path: PathBuf,
}

impl ManualAdapter {
    pub fn new(tasks_rel_path: PathBuf) -> Self {
        Self { tasks_rel_path }
    }
}

#[async_trait]
impl AgentAdapter for ManualAdapter {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn setup_session(&self, workspace: &Path, task: &Task) -> Result<()> {
        let path = self.context_path(workspace);
        let doc = render_task_context(task, &self.tasks_rel_path);
        tokio::fs::write(&path, doc)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn notify_user(&self, session_id: usize, workspace: &Path, task: &Task) {
        let abs = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        info!(
            session = session_id,
            task = %task.id,
            workspace = %abs.display(),
            "session ready: implement the task described in SPECKIT-TASK.md"
        );
        println!(
            "Session {}: implement {} in {} (brief: SPECKIT-TASK.md)",
            session_id,
            task.id,
            abs.display()
        );
    }

    fn watch_paths(&self, workspace: &Path) -> Vec<PathBuf> {
        vec![workspace.join(&self.tasks_rel_path)]
    }

    fn context_path(&self, workspace: &Path) -> PathBuf {
        workspace.join("SPECKIT-TASK.md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn context_lands_at_workspace_root() {
        let dir = tempdir().unwrap();
        let adapter = ManualAdapter::new(PathBuf::from("specs/001/tasks.md"));
        adapter
            .setup_session(dir.path(), &Task::new("T002", "Fix parser"))
            .await
            .unwrap();
        assert!(dir.path().join("SPECKIT-TASK.md").exists());
    }
}
