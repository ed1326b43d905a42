//! Folding session branches back into one integration branch.
//!
//! Analysis walks each session branch's diff against its merge-base with the
//! base branch to find overlapping edits before anything is mutated. The
//! merge itself is sequential no-fast-forward merges in ascending session
//! order; a conflict triggers full cleanup (abort, checkout base, delete the
//! integration branch) so the working copy is never left broken.

use crate::errors::WorkspaceError;
use crate::workspace::WorktreeManager;
use anyhow::{Context, Result, bail};
use git2::{Delta, Repository};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Name of the integration branch: `impl-{spec_id}-integrated`.
pub fn integration_branch(spec_id: &str) -> String {
    format!("impl-{}-integrated", spec_id)
}

/// Files a single session changed relative to its merge-base.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionChanges {
    pub session_id: usize,
    pub branch: String,
    pub files_added: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
}

impl SessionChanges {
    /// Every path this session touched.
    pub fn touched(&self) -> impl Iterator<Item = &String> {
        self.files_added
            .iter()
            .chain(&self.files_modified)
            .chain(&self.files_deleted)
    }
}

/// Cross-session overlap analysis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeAnalysis {
    pub sessions: Vec<SessionChanges>,
    /// Path -> sessions that touched it, restricted to paths touched by two
    /// or more sessions.
    pub overlapping_files: BTreeMap<String, BTreeSet<usize>>,
    pub total_files_changed: usize,
    pub safe_to_merge: bool,
}

/// Outcome of a sequential merge attempt.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub success: bool,
    pub integration_branch: String,
    /// Session ids merged so far, in order.
    pub merged_sessions: Vec<usize>,
    /// The session whose merge conflicted, if any.
    pub conflict_session: Option<usize>,
    pub conflicting_files: Vec<String>,
}

/// Final integration summary.
#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub files_changed: usize,
    pub lines_added: usize,
    pub lines_deleted: usize,
    pub workspaces_removed: usize,
    pub integration_branch: String,
}

/// Merges a spec's session branches onto an integration branch.
pub struct MergeIntegrator {
    repo_root: PathBuf,
    spec_id: String,
    base_branch: String,
    worktrees: WorktreeManager,
}

impl MergeIntegrator {
    pub fn new(repo_root: PathBuf, spec_id: &str, base_branch: &str) -> Self {
        let worktrees = WorktreeManager::new(repo_root.clone());
        Self {
            repo_root,
            spec_id: spec_id.to_string(),
            base_branch: base_branch.to_string(),
            worktrees,
        }
    }

    fn session_branch_prefix(&self) -> String {
        format!("impl-{}-session-", self.spec_id)
    }

    /// Local session branches for this spec, ascending by session id.
    pub fn session_branches(&self) -> Result<Vec<(usize, String)>> {
        let repo = Repository::open(&self.repo_root).context("Failed to open git repository")?;
        let prefix = self.session_branch_prefix();
        let mut branches = Vec::new();
        for entry in repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = entry?;
            let Some(name) = branch.name()? else {
                continue;
            };
            if let Some(suffix) = name.strip_prefix(&prefix)
                && let Ok(session_id) = suffix.parse::<usize>()
            {
                branches.push((session_id, name.to_string()));
            }
        }
        branches.sort();
        Ok(branches)
    }

    /// Diff every session branch against its merge-base with the base
    /// branch and report overlapping edits.
    pub fn analyze(&self) -> Result<MergeAnalysis> {
        let repo = Repository::open(&self.repo_root).context("Failed to open git repository")?;
        let base_commit = repo
            .revparse_single(&self.base_branch)
            .with_context(|| format!("Base branch '{}' not found", self.base_branch))?
            .peel_to_commit()?;

        let mut sessions = Vec::new();
        let mut touched_by: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();

        for (session_id, branch_name) in self.session_branches()? {
            let branch_commit = repo
                .revparse_single(&branch_name)
                .with_context(|| format!("Branch '{}' not found", branch_name))?
                .peel_to_commit()?;

            let base_oid = repo
                .merge_base(base_commit.id(), branch_commit.id())
                .with_context(|| {
                    format!(
                        "No merge-base between '{}' and '{}'",
                        self.base_branch, branch_name
                    )
                })?;
            let merge_base_tree = repo.find_commit(base_oid)?.tree()?;
            let branch_tree = branch_commit.tree()?;

            let diff =
                repo.diff_tree_to_tree(Some(&merge_base_tree), Some(&branch_tree), None)?;

            let mut changes = SessionChanges {
                session_id,
                branch: branch_name,
                ..Default::default()
            };
            for delta in diff.deltas() {
                let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path())
                else {
                    continue;
                };
                let path = path.to_string_lossy().into_owned();
                match delta.status() {
                    Delta::Added => changes.files_added.push(path),
                    Delta::Modified | Delta::Renamed => changes.files_modified.push(path),
                    Delta::Deleted => changes.files_deleted.push(path),
                    _ => {}
                }
            }

            for path in changes.touched() {
                touched_by.entry(path.clone()).or_default().insert(session_id);
            }
            sessions.push(changes);
        }

        let total_files_changed = touched_by.len();
        let overlapping_files: BTreeMap<String, BTreeSet<usize>> = touched_by
            .into_iter()
            .filter(|(_, sessions)| sessions.len() >= 2)
            .collect();
        let safe_to_merge = overlapping_files.is_empty();

        Ok(MergeAnalysis {
            sessions,
            overlapping_files,
            total_files_changed,
            safe_to_merge,
        })
    }

    /// Run git with `args` at the repository root.
    async fn git(&self, args: &[&str]) -> Result<std::process::Output, WorkspaceError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(WorkspaceError::Spawn)
    }

    /// Run git, treating non-zero exit as an error.
    async fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(WorkspaceError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into())
        }
    }

    /// Paths currently unmerged in the working copy.
    async fn unmerged_paths(&self) -> Result<Vec<String>> {
        let output = self
            .git_ok(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Abort the in-flight merge, return to base, delete the integration
    /// branch. Leaves the working copy clean.
    async fn cleanup_failed_merge(&self, target: &str) {
        let _ = self.git(&["merge", "--abort"]).await;
        if let Err(e) = self.git_ok(&["checkout", &self.base_branch]).await {
            warn!(error = %e, "failed to check out base branch during cleanup");
        }
        let _ = self.git(&["branch", "-D", target]).await;
    }

    /// Merge all session branches onto a fresh integration branch, in
    /// ascending session order, with non-fast-forward merges.
    ///
    /// A conflict produces a failed [`MergeResult`] after cleanup; any other
    /// VCS failure cleans up and propagates.
    pub async fn merge_sequential(&self, base_branch: Option<&str>) -> Result<MergeResult> {
        let base = base_branch.unwrap_or(&self.base_branch);
        let target = integration_branch(&self.spec_id);

        let branches = self.session_branches()?;
        if branches.is_empty() {
            bail!(
                "No session branches matching '{}*' to merge. Run the orchestration first.",
                self.session_branch_prefix()
            );
        }

        let repo = Repository::open(&self.repo_root).context("Failed to open git repository")?;
        if repo.find_branch(&target, git2::BranchType::Local).is_ok() {
            bail!(
                "Integration branch '{}' already exists. Delete it before re-merging.",
                target
            );
        }

        self.git_ok(&["checkout", "-b", &target, base]).await?;
        info!(branch = %target, base = %base, "created integration branch");

        let mut merged_sessions = Vec::new();
        for (session_id, branch_name) in branches {
            let message = format!(
                "Merge session {} ({}) into {}",
                session_id, branch_name, target
            );
            let output = self
                .git(&["merge", "--no-ff", "-m", &message, &branch_name])
                .await?;

            if output.status.success() {
                info!(session = session_id, branch = %branch_name, "merged session");
                merged_sessions.push(session_id);
                continue;
            }

            let conflicting_files = self.unmerged_paths().await.unwrap_or_default();
            if conflicting_files.is_empty() {
                // Not a content conflict: clean up and surface the VCS error.
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                self.cleanup_failed_merge(&target).await;
                return Err(WorkspaceError::Git {
                    command: format!("merge --no-ff {}", branch_name),
                    stderr,
                }
                .into());
            }

            warn!(
                session = session_id,
                files = conflicting_files.len(),
                "merge conflict; rolling back integration branch"
            );
            self.cleanup_failed_merge(&target).await;
            return Ok(MergeResult {
                success: false,
                integration_branch: target,
                merged_sessions,
                conflict_session: Some(session_id),
                conflicting_files,
            });
        }

        Ok(MergeResult {
            success: true,
            integration_branch: target,
            merged_sessions,
            conflict_session: None,
            conflicting_files: Vec::new(),
        })
    }

    /// Run the user-supplied validation command on the integration branch.
    ///
    /// Returns `(success, combined_output)`. A null command validates
    /// trivially. The command is shell-interpreted by design.
    pub async fn validate(&self, test_command: Option<&str>) -> Result<(bool, String)> {
        let Some(command) = test_command else {
            return Ok((true, String::new()));
        };

        let target = integration_branch(&self.spec_id);
        if let Err(e) = self.git_ok(&["checkout", &target]).await {
            return Ok((false, format!("Failed to check out '{}': {}", target, e)));
        }

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run validation command: {}", command))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((output.status.success(), combined))
    }

    /// Compute diff statistics for the integration branch and tear down the
    /// spec's workspaces.
    ///
    /// Statistics come from the merge-base-to-HEAD diff of the integration
    /// branch; any failure there degrades to zeros rather than raising.
    pub async fn finalize(&self, keep_workspaces: bool) -> Result<MergeSummary> {
        let target = integration_branch(&self.spec_id);
        let (files_changed, lines_added, lines_deleted) =
            self.integration_diffstat(&target).unwrap_or_default();

        let workspaces_removed = if keep_workspaces {
            0
        } else {
            self.worktrees.cleanup_spec(&self.spec_id).await?
        };

        Ok(MergeSummary {
            files_changed,
            lines_added,
            lines_deleted,
            workspaces_removed,
            integration_branch: target,
        })
    }

    fn integration_diffstat(&self, target: &str) -> Option<(usize, usize, usize)> {
        let repo = Repository::open(&self.repo_root).ok()?;
        let base_commit = repo
            .revparse_single(&self.base_branch)
            .ok()?
            .peel_to_commit()
            .ok()?;
        let head_commit = repo.revparse_single(target).ok()?.peel_to_commit().ok()?;
        let merge_base = repo.merge_base(base_commit.id(), head_commit.id()).ok()?;
        let base_tree = repo.find_commit(merge_base).ok()?.tree().ok()?;
        let head_tree = head_commit.tree().ok()?;
        let diff = repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)
            .ok()?;
        let stats = diff.stats().ok()?;
        Some((stats.files_changed(), stats.insertions(), stats.deletions()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "test").unwrap();
            config.set_str("user.email", "test@test.com").unwrap();
        }
        std::fs::write(dir.join("shared.txt"), "base\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        // Pin the base branch name regardless of init.defaultBranch.
        {
            let head = repo.head().unwrap().peel_to_commit().unwrap();
            repo.branch("main", &head, true).unwrap();
        }
        repo.set_head("refs/heads/main").unwrap();
        repo.checkout_head(None).unwrap();
        repo
    }

    /// Commit `files` onto `branch` (created from main if missing) without
    /// switching the working copy.
    fn commit_on_branch(dir: &Path, branch: &str, files: &[(&str, &str)], msg: &str) {
        let repo = Repository::open(dir).unwrap();
        let parent = match repo.find_branch(branch, git2::BranchType::Local) {
            Ok(b) => b.get().peel_to_commit().unwrap(),
            Err(_) => {
                let main = repo
                    .find_branch("main", git2::BranchType::Local)
                    .unwrap()
                    .get()
                    .peel_to_commit()
                    .unwrap();
                repo.branch(branch, &main, false).unwrap();
                main
            }
        };

        let mut builder = repo
            .treebuilder(Some(&parent.tree().unwrap()))
            .unwrap();
        for (name, content) in files {
            let oid = repo.blob(content.as_bytes()).unwrap();
            builder.insert(*name, oid, 0o100644).unwrap();
        }
        let tree_id = builder.write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(
            Some(&format!("refs/heads/{}", branch)),
            &sig,
            &sig,
            msg,
            &tree,
            &[&parent],
        )
        .unwrap();
    }

    #[test]
    fn analyze_reports_disjoint_changes_as_safe() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("alpha.txt", "a\n")],
            "s0",
        );
        commit_on_branch(
            dir.path(),
            "impl-001-session-1",
            &[("beta.txt", "b\n")],
            "s1",
        );

        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let analysis = integrator.analyze().unwrap();

        assert_eq!(analysis.sessions.len(), 2);
        assert_eq!(analysis.total_files_changed, 2);
        assert!(analysis.safe_to_merge);
        assert!(analysis.overlapping_files.is_empty());
    }

    #[test]
    fn analyze_flags_overlapping_modifications() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("shared.txt", "from zero\n")],
            "s0",
        );
        commit_on_branch(
            dir.path(),
            "impl-001-session-1",
            &[("shared.txt", "from one\n")],
            "s1",
        );

        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let analysis = integrator.analyze().unwrap();

        assert!(!analysis.safe_to_merge);
        let sessions = analysis.overlapping_files.get("shared.txt").unwrap();
        assert_eq!(sessions.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn merge_sequential_merges_disjoint_sessions() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("alpha.txt", "a\n")],
            "s0",
        );
        commit_on_branch(
            dir.path(),
            "impl-001-session-1",
            &[("beta.txt", "b\n")],
            "s1",
        );

        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let result = integrator.merge_sequential(None).await.unwrap();

        assert!(result.success);
        assert_eq!(result.merged_sessions, vec![0, 1]);
        let repo = Repository::open(dir.path()).unwrap();
        assert!(
            repo.find_branch("impl-001-integrated", git2::BranchType::Local)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn merge_conflict_cleans_up_completely() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("shared.txt", "zero\n")],
            "s0",
        );
        commit_on_branch(
            dir.path(),
            "impl-001-session-1",
            &[("shared.txt", "one\n")],
            "s1",
        );

        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let result = integrator.merge_sequential(None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.merged_sessions, vec![0]);
        assert_eq!(result.conflict_session, Some(1));
        assert_eq!(result.conflicting_files, vec!["shared.txt"]);

        let repo = Repository::open(dir.path()).unwrap();
        // Integration branch is gone, working copy is back on base, and no
        // merge is in progress.
        assert!(
            repo.find_branch("impl-001-integrated", git2::BranchType::Local)
                .is_err()
        );
        assert_eq!(repo.head().unwrap().shorthand(), Some("main"));
        assert!(!dir.path().join(".git/MERGE_HEAD").exists());
        // Session branches untouched.
        assert!(
            repo.find_branch("impl-001-session-1", git2::BranchType::Local)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn merge_without_session_branches_errors() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let err = integrator.merge_sequential(None).await.unwrap_err();
        assert!(err.to_string().contains("No session branches"));
    }

    #[tokio::test]
    async fn existing_integration_branch_errors() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("alpha.txt", "a\n")],
            "s0",
        );
        commit_on_branch(
            dir.path(),
            "impl-001-integrated",
            &[("stale.txt", "x\n")],
            "stale",
        );

        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let err = integrator.merge_sequential(None).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn validate_null_command_passes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let (ok, output) = integrator.validate(None).await.unwrap();
        assert!(ok);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn validate_runs_command_on_integration_branch() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("alpha.txt", "a\n")],
            "s0",
        );
        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        integrator.merge_sequential(None).await.unwrap();

        let (ok, output) = integrator
            .validate(Some("cat alpha.txt && echo checked"))
            .await
            .unwrap();
        assert!(ok);
        assert!(output.contains("checked"));

        let (ok, _) = integrator.validate(Some("false")).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn finalize_reports_diffstat_and_keeps_branch() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_on_branch(
            dir.path(),
            "impl-001-session-0",
            &[("alpha.txt", "a\nb\n")],
            "s0",
        );
        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        integrator.merge_sequential(None).await.unwrap();

        let summary = integrator.finalize(true).await.unwrap();
        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.lines_added, 2);
        assert_eq!(summary.lines_deleted, 0);
        assert_eq!(summary.workspaces_removed, 0);
        assert_eq!(summary.integration_branch, "impl-001-integrated");
    }

    #[tokio::test]
    async fn finalize_without_integration_branch_degrades_to_zeros() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let integrator = MergeIntegrator::new(dir.path().to_path_buf(), "001", "main");
        let summary = integrator.finalize(true).await.unwrap();
        assert_eq!(summary.files_changed, 0);
        assert_eq!(summary.lines_added, 0);
    }
}
