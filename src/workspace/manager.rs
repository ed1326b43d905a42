//! Per-session worktree lifecycle.
//!
//! Every session gets an isolated working copy under
//! `.worktrees-{spec_id}/session-{id}-{slug}/`, checked out at its own
//! `impl-{spec_id}-session-{id}` branch. All operations shell out to the
//! `git` binary with captured output; branches are deliberately preserved on
//! teardown so abandoned work stays recoverable.

use crate::errors::WorkspaceError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum length of the task-name slug in workspace directory names.
const SLUG_MAX_LEN: usize = 50;

/// Branch name for a session: `impl-{spec_id}-session-{session_id}`.
pub fn session_branch(spec_id: &str, session_id: usize) -> String {
    format!("impl-{}-session-{}", spec_id, session_id)
}

/// Turn a task name into a filesystem-safe slug: lowercase, runs of
/// non-alphanumerics collapsed to `-`, capped at 50 characters with no
/// dangling hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.truncate(SLUG_MAX_LEN);
    slug.trim_matches('-').to_string()
}

/// One worktree as reported by `git worktree list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    /// Checked-out branch, if not detached.
    pub branch: Option<String>,
    pub head: Option<String>,
}

/// Parse `git worktree list --porcelain` output.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(info) = current.take() {
                worktrees.push(info);
            }
            current = Some(WorktreeInfo {
                path: PathBuf::from(path),
                branch: None,
                head: None,
            });
        } else if let Some(info) = current.as_mut() {
            if let Some(sha) = line.strip_prefix("HEAD ") {
                info.head = Some(sha.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                info.branch = Some(
                    branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch)
                        .to_string(),
                );
            }
        }
    }
    if let Some(info) = current.take() {
        worktrees.push(info);
    }
    worktrees
}

/// Manager for session worktrees of one repository.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    repo_root: PathBuf,
}

impl WorktreeManager {
    /// Create a manager rooted at the repository.
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    /// Parent directory for a spec's worktrees.
    pub fn spec_dir(&self, spec_id: &str) -> PathBuf {
        self.repo_root.join(format!(".worktrees-{}", spec_id))
    }

    /// Run git with `args` in the repository root, capturing output.
    async fn git(&self, args: &[&str]) -> Result<String, WorkspaceError> {
        self.git_in(&self.repo_root, args).await
    }

    /// Run git with `args` in `dir`, capturing output.
    async fn git_in(&self, dir: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
        debug!(?args, dir = %dir.display(), "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(WorkspaceError::Spawn)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(WorkspaceError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Check whether a local branch exists.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool, WorkspaceError> {
        let result = self
            .git(&[
                "rev-parse",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", branch),
            ])
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(WorkspaceError::Git { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a session workspace: a new branch plus a worktree checked out
    /// at it. Returns the workspace path.
    pub async fn create(
        &self,
        spec_id: &str,
        session_id: usize,
        task_name: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let branch = session_branch(spec_id, session_id);
        let dir = self
            .spec_dir(spec_id)
            .join(format!("session-{}-{}", session_id, slugify(task_name)));

        if dir.exists() || self.branch_exists(&branch).await? {
            return Err(WorkspaceError::Exists { path: dir, branch });
        }

        let dir_str = dir.to_string_lossy().into_owned();
        self.git(&["worktree", "add", "-b", &branch, &dir_str])
            .await?;
        debug!(branch = %branch, path = %dir.display(), "created session workspace");
        Ok(dir)
    }

    /// All worktrees known to the repository.
    pub async fn list(&self) -> Result<Vec<WorktreeInfo>, WorkspaceError> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&output))
    }

    /// Worktrees under the spec's parent directory.
    pub async fn spec_workspaces(
        &self,
        spec_id: &str,
    ) -> Result<Vec<WorktreeInfo>, WorkspaceError> {
        let spec_dir = self.spec_dir(spec_id);
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|info| info.path.starts_with(&spec_dir))
            .collect())
    }

    /// Check whether a workspace has uncommitted modifications.
    pub async fn is_dirty(&self, path: &Path) -> Result<bool, WorkspaceError> {
        let output = self.git_in(path, &["status", "--porcelain"]).await?;
        Ok(!output.trim().is_empty())
    }

    /// Remove a workspace. Refuses to discard uncommitted changes unless
    /// `force` is set. The session branch survives either way.
    pub async fn remove(&self, path: &Path, force: bool) -> Result<(), WorkspaceError> {
        if !force && self.is_dirty(path).await? {
            return Err(WorkspaceError::Dirty {
                path: path.to_path_buf(),
            });
        }

        let path_str = path.to_string_lossy().into_owned();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.git(&args).await?;
        Ok(())
    }

    /// Force-remove every workspace of the spec and delete the parent
    /// directory. Partial failures are logged, not fatal; returns the number
    /// of workspaces actually removed. Branches are preserved for recovery.
    pub async fn cleanup_spec(&self, spec_id: &str) -> Result<usize, WorkspaceError> {
        let workspaces = self.spec_workspaces(spec_id).await?;
        let mut removed = 0;
        for info in workspaces {
            match self.remove(&info.path, true).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %info.path.display(), error = %e, "failed to remove workspace");
                }
            }
        }

        let spec_dir = self.spec_dir(spec_id);
        if spec_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&spec_dir) {
                warn!(path = %spec_dir.display(), error = %e, "failed to remove worktrees directory");
            }
        }
        // Drop stale administrative entries left by any failed removals.
        let _ = self.git(&["worktree", "prune"]).await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        let repo = git2::Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        std::fs::write(dir.join("README.md"), "seed\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
    }

    #[test]
    fn slugify_collapses_and_lowercases() {
        assert_eq!(slugify("Set up the DB schema!"), "set-up-the-db-schema");
        assert_eq!(slugify("API/v2: endpoints"), "api-v2-endpoints");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn slugify_caps_at_fifty_without_trailing_hyphen() {
        let long = "a ".repeat(100);
        let slug = slugify(&long);
        assert!(slug.len() <= 50);
        assert!(!slug.ends_with('-'));
        assert!(!slug.starts_with('-'));

        // A 200-char name lands exactly on the cap when the boundary allows.
        let dense = "x".repeat(200);
        assert_eq!(slugify(&dense).len(), 50);
    }

    #[test]
    fn session_branch_format() {
        assert_eq!(session_branch("001-api", 2), "impl-001-api-session-2");
    }

    #[test]
    fn parses_porcelain_worktree_list() {
        let output = "\
worktree /repo
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /repo/.worktrees-001/session-0-setup
HEAD 2222222222222222222222222222222222222222
branch refs/heads/impl-001-session-0

worktree /repo/.worktrees-001/session-1-api
HEAD 3333333333333333333333333333333333333333
detached
";
        let worktrees = parse_worktree_list(output);
        assert_eq!(worktrees.len(), 3);
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
        assert_eq!(
            worktrees[1].branch.as_deref(),
            Some("impl-001-session-0")
        );
        assert!(worktrees[2].branch.is_none());
        assert_eq!(
            worktrees[2].head.as_deref(),
            Some("3333333333333333333333333333333333333333")
        );
    }

    #[tokio::test]
    async fn create_list_remove_lifecycle() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path().to_path_buf());

        let path = manager.create("001", 0, "Bootstrap the repo").await.unwrap();
        assert!(path.exists());
        assert!(path.ends_with(".worktrees-001/session-0-bootstrap-the-repo"));
        assert!(manager.branch_exists("impl-001-session-0").await.unwrap());

        let spec = manager.spec_workspaces("001").await.unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0].branch.as_deref(), Some("impl-001-session-0"));

        manager.remove(&path, false).await.unwrap();
        assert!(manager.spec_workspaces("001").await.unwrap().is_empty());
        // Branch preserved after removal.
        assert!(manager.branch_exists("impl-001-session-0").await.unwrap());
    }

    #[tokio::test]
    async fn create_twice_fails_with_exists() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path().to_path_buf());

        manager.create("001", 0, "setup").await.unwrap();
        let err = manager.create("001", 0, "setup").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Exists { .. }));
    }

    #[tokio::test]
    async fn dirty_workspace_refuses_removal_without_force() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path().to_path_buf());

        let path = manager.create("001", 0, "setup").await.unwrap();
        std::fs::write(path.join("scratch.txt"), "wip").unwrap();

        let err = manager.remove(&path, false).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Dirty { .. }));

        manager.remove(&path, true).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cleanup_spec_removes_everything_and_reports_count() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path().to_path_buf());

        let a = manager.create("001", 0, "alpha").await.unwrap();
        manager.create("001", 1, "beta").await.unwrap();
        std::fs::write(a.join("wip.txt"), "dirty").unwrap();

        let removed = manager.cleanup_spec("001").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!manager.spec_dir("001").exists());
        // Branches survive cleanup.
        assert!(manager.branch_exists("impl-001-session-0").await.unwrap());
        assert!(manager.branch_exists("impl-001-session-1").await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_missing_spec_is_zero() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path().to_path_buf());
        assert_eq!(manager.cleanup_spec("nope").await.unwrap(), 0);
    }
}
