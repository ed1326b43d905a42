//! Repository discovery and canonical path layout.
//!
//! Everything the orchestrator persists lives in two places relative to the
//! repository root: `.speckit/` for runtime state and `specs/<feature>/` for
//! the human-authored inputs. The current feature defaults to the checked-out
//! branch name and can be overridden with the `SPECKIT_FEATURE` environment
//! variable.

use anyhow::{Context, Result, anyhow};
use git2::Repository;
use std::path::{Path, PathBuf};

/// Environment variable that overrides current-feature resolution.
pub const FEATURE_ENV_VAR: &str = "SPECKIT_FEATURE";

/// Resolved repository and feature context.
///
/// All orchestrator components take paths from here rather than computing
/// their own, so the on-disk layout is defined exactly once.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    /// Absolute repository root.
    pub repo_root: PathBuf,
    /// Feature identifier, e.g. `001-user-auth`.
    pub feature: String,
}

impl FeatureContext {
    /// Discover the repository containing `start_dir` and resolve the feature.
    ///
    /// Fails with a remediation hint when `start_dir` is not inside a git
    /// repository or no feature is resolvable (detached HEAD and no
    /// `SPECKIT_FEATURE` override).
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(start_dir).map_err(|_| {
            anyhow!(
                "Not inside a git repository: {}. Run speckit-flow from your project checkout.",
                start_dir.display()
            )
        })?;
        let repo_root = repo
            .workdir()
            .ok_or_else(|| anyhow!("Repository at {} is bare", start_dir.display()))?
            .to_path_buf();

        let feature = match std::env::var(FEATURE_ENV_VAR) {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                let head = repo.head().context("Failed to read HEAD")?;
                head.shorthand()
                    .filter(|name| *name != "HEAD")
                    .map(str::to_string)
                    .ok_or_else(|| {
                        anyhow!(
                            "Cannot resolve current feature: HEAD is detached. \
                             Check out a feature branch or set {}.",
                            FEATURE_ENV_VAR
                        )
                    })?
            }
        };

        Ok(Self { repo_root, feature })
    }

    /// Build a context from known parts (used by tests and by commands that
    /// already validated the environment).
    pub fn new(repo_root: PathBuf, feature: impl Into<String>) -> Self {
        Self {
            repo_root,
            feature: feature.into(),
        }
    }

    /// `.speckit/` runtime directory.
    pub fn speckit_dir(&self) -> PathBuf {
        self.repo_root.join(".speckit")
    }

    /// The orchestration state document.
    pub fn state_path(&self) -> PathBuf {
        self.speckit_dir().join("flow-state.yaml")
    }

    /// Checkpoint snapshot directory.
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.speckit_dir().join("checkpoints")
    }

    /// Sentinel-file directory for manual completions.
    pub fn completions_dir(&self) -> PathBuf {
        self.speckit_dir().join("completions")
    }

    /// The orchestrator configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.speckit_dir().join("speckit-flow.yaml")
    }

    /// `specs/` root for all features.
    pub fn specs_dir(&self) -> PathBuf {
        self.repo_root.join("specs")
    }

    /// The current feature's directory.
    pub fn feature_dir(&self) -> PathBuf {
        self.specs_dir().join(&self.feature)
    }

    /// The human-authored task list.
    pub fn tasks_path(&self) -> PathBuf {
        self.feature_dir().join("tasks.md")
    }

    /// The serialized DAG artifact.
    pub fn dag_path(&self) -> PathBuf {
        self.feature_dir().join("dag.yaml")
    }

    /// Parent directory for the feature's session worktrees.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.repo_root.join(format!(".worktrees-{}", self.feature))
    }

    /// Create the `.speckit/` tree if missing.
    pub fn ensure_speckit_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.speckit_dir())
            .context("Failed to create .speckit directory")?;
        std::fs::create_dir_all(self.checkpoints_dir())
            .context("Failed to create checkpoints directory")?;
        std::fs::create_dir_all(self.completions_dir())
            .context("Failed to create completions directory")?;
        Ok(())
    }
}
