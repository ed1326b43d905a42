//! The session coordinator: owns the orchestration lifecycle.
//!
//! Single-threaded by design. The parallelism is external: one human plus
//! assistant per workspace. The coordinator fans notifications out at the
//! start of each phase, blocks on the union completion signal for the
//! phase's full task set, and persists state before and after every status
//! transition so an interrupt at any point resumes cleanly.

use crate::agent::{AgentAdapter, adapter_for};
use crate::completion::{CompletionDetector, DEFAULT_POLL_INTERVAL};
use crate::config::FlowConfig;
use crate::dag::{DagEngine, phase_name};
use crate::errors::CompletionError;
use crate::interrupt::{CancelToken, install_interrupt_handler};
use crate::paths::FeatureContext;
use crate::state::{
    CheckpointStore, DEFAULT_CHECKPOINT_RETENTION, OrchestrationState, SessionState,
    SessionStatus, StateStore, TaskState, TaskStatus,
};
use crate::workspace::{WorktreeManager, session_branch};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Parse the index out of a `phase-{i}` name.
pub fn parse_phase_index(name: &str) -> Option<usize> {
    name.strip_prefix("phase-")?.parse().ok()
}

/// How a full `run()` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase completed and final state was written.
    Completed,
    /// A cooperative interrupt stopped the run; state resumes it.
    Interrupted,
}

/// Drives phases in order across the configured sessions.
pub struct SessionCoordinator {
    ctx: FeatureContext,
    config: FlowConfig,
    engine: DagEngine,
    base_branch: String,
    store: StateStore,
    checkpoints: CheckpointStore,
    worktrees: WorktreeManager,
    detector: CompletionDetector,
    adapter: Arc<dyn AgentAdapter>,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl SessionCoordinator {
    /// Build a coordinator. `engine` must already carry session assignments;
    /// `base_branch` is what integration will later be measured against.
    pub fn new(
        ctx: FeatureContext,
        config: FlowConfig,
        engine: DagEngine,
        base_branch: String,
    ) -> Self {
        let tasks_rel = PathBuf::from("specs").join(&ctx.feature).join("tasks.md");
        let adapter = adapter_for(config.agent_type(), tasks_rel);
        let store = StateStore::new(ctx.state_path());
        let checkpoints = CheckpointStore::new(ctx.checkpoints_dir());
        let worktrees = WorktreeManager::new(ctx.repo_root.clone());
        let detector = CompletionDetector::new(ctx.completions_dir());

        Self {
            ctx,
            config,
            engine,
            base_branch,
            store,
            checkpoints,
            worktrees,
            detector,
            adapter,
            cancel: CancelToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// The coordinator's cancellation token. External drivers (or tests) may
    /// set it to stop the run at the next poll.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Override the completion poll interval (tests).
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// The state store this coordinator persists through.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Create workspaces and the initial state document.
    ///
    /// Sessions with no assigned tasks are skipped entirely; their worktrees
    /// are never created. The saved document is complete: every task has a
    /// pending record and every active session a workspace and branch.
    pub async fn initialize(&mut self) -> Result<OrchestrationState> {
        self.ctx.ensure_speckit_dirs()?;
        self.engine.assign_sessions(self.config.num_sessions);

        let mut state = OrchestrationState::new(
            &self.ctx.feature,
            self.config.agent_type(),
            self.config.num_sessions,
            &self.base_branch,
        );

        for session_id in 0..self.config.num_sessions {
            let assigned = self.engine.session_tasks(session_id);
            let Some(first) = assigned.first() else {
                info!(session = session_id, "no tasks assigned; skipping session");
                continue;
            };
            let first = (*first).clone();

            let workspace = self
                .worktrees
                .create(&self.ctx.feature, session_id, &first.name)
                .await
                .with_context(|| format!("Failed to create workspace for session {}", session_id))?;
            self.adapter
                .setup_session(&workspace, &first)
                .await
                .with_context(|| format!("Failed to set up session {}", session_id))?;

            let worktree_path = workspace
                .strip_prefix(&self.ctx.repo_root)
                .unwrap_or(&workspace)
                .to_string_lossy()
                .into_owned();
            state.sessions.push(SessionState {
                session_id,
                worktree_path,
                branch_name: session_branch(&self.ctx.feature, session_id),
                current_task: None,
                completed_tasks: Vec::new(),
                status: SessionStatus::Idle,
            });
        }

        for task in self.engine.tasks() {
            let session = task.session.unwrap_or(0);
            state
                .tasks
                .insert(task.id.clone(), TaskState::pending(session));
        }

        state.touch();
        self.store.save(&state)?;
        info!(
            sessions = state.sessions.len(),
            tasks = state.tasks.len(),
            "orchestration initialized"
        );
        Ok(state)
    }

    /// Execute one phase to completion: mark its tasks in progress, notify
    /// every active session, and block on the full task set.
    ///
    /// State is saved before the wait and after completion; an interrupt or
    /// failure mid-wait leaves the in-progress markers in place for resume.
    pub async fn run_phase(&self, index: usize) -> Result<()> {
        let phase_ids: Vec<String> = self.engine.phase_tasks(index)?.to_vec();
        let name = phase_name(index);
        info!(phase = %name, tasks = phase_ids.len(), "starting phase");

        // Group the phase's tasks by session, in ascending session order.
        let mut by_session: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in &phase_ids {
            let task = self.engine.get_task(id)?;
            by_session
                .entry(task.session.unwrap_or(0))
                .or_default()
                .push(id.clone());
        }

        let mut state = self.store.load()?;
        state.current_phase = name.clone();
        let now = Utc::now();
        // Only the session's first unfinished task goes in_progress: a
        // serialized phase hands a session several tasks, but a session works
        // one task at a time.
        let mut active_task: BTreeMap<usize, String> = BTreeMap::new();
        for (&session_id, ids) in &by_session {
            let current = ids
                .iter()
                .find(|id| {
                    state
                        .tasks
                        .get(*id)
                        .is_none_or(|t| t.status != TaskStatus::Completed)
                })
                .cloned()
                .unwrap_or_else(|| ids[0].clone());
            if let Some(session) = state.session_mut(session_id) {
                session.status = SessionStatus::Executing;
                session.current_task = Some(current.clone());
            }
            if let Some(task) = state.tasks.get_mut(&current)
                && task.status != TaskStatus::Completed
            {
                task.status = TaskStatus::InProgress;
                task.started_at = Some(now);
            }
            active_task.insert(session_id, current);
        }
        state.touch();
        self.store.save(&state)?;

        for (&session_id, current) in &active_task {
            let Some(session) = state.session(session_id) else {
                continue;
            };
            let workspace = self.ctx.repo_root.join(&session.worktree_path);
            let task = self.engine.get_task(current)?;
            // Refresh the workspace brief so the assistant sees the current
            // task, then prompt the operator.
            if let Err(e) = self.adapter.setup_session(&workspace, task).await {
                warn!(session = session_id, error = %e, "failed to refresh session context");
            }
            self.adapter.notify_user(session_id, &workspace, task);
        }

        let wanted: BTreeSet<String> = phase_ids.iter().cloned().collect();
        let tasks_path = self.ctx.tasks_path();
        self.detector
            .wait_for_completion(
                &wanted,
                Some(&tasks_path),
                None,
                self.poll_interval,
                &self.cancel,
            )
            .await?;

        // Full set observed: mark everything in the phase completed.
        let mut state = self.store.load()?;
        let now = Utc::now();
        for (&session_id, ids) in &by_session {
            for id in ids {
                if let Some(task) = state.tasks.get_mut(id)
                    && task.status != TaskStatus::Completed
                {
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(now);
                }
            }
            if let Some(session) = state.session_mut(session_id) {
                for id in ids {
                    if !session.completed_tasks.contains(id) {
                        session.completed_tasks.push(id.clone());
                    }
                }
                session.current_task = None;
            }
            let remaining = state.remaining_tasks_for(session_id);
            if let Some(session) = state.session_mut(session_id) {
                session.status = if remaining.is_empty() {
                    SessionStatus::Completed
                } else {
                    SessionStatus::Idle
                };
            }
        }
        if !state.phases_completed.contains(&name) {
            state.phases_completed.push(name.clone());
        }
        state.touch();
        self.store.save(&state)?;
        info!(phase = %name, "phase complete");
        Ok(())
    }

    /// Snapshot current state and prune old snapshots.
    pub fn checkpoint_phase(&self) -> Result<PathBuf> {
        let state = self.store.load()?;
        let path = self.checkpoints.checkpoint(&state)?;
        self.checkpoints.prune(DEFAULT_CHECKPOINT_RETENTION)?;
        Ok(path)
    }

    /// Which phase a loaded state should resume at.
    fn start_phase(&self, state: &OrchestrationState) -> Result<usize> {
        let Some(index) = parse_phase_index(&state.current_phase) else {
            bail!(
                "State file has unrecognized current_phase '{}'",
                state.current_phase
            );
        };
        if state.phases_completed.contains(&state.current_phase) {
            Ok(index + 1)
        } else {
            Ok(index)
        }
    }

    /// Full orchestration: initialize or resume, then run remaining phases
    /// with a checkpoint after each.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let _signal_guard = install_interrupt_handler(self.cancel.clone());

        // Assignment is deterministic, so recomputing on resume reproduces
        // the sessions recorded in state.
        self.engine.assign_sessions(self.config.num_sessions);

        let start = if self.store.exists() {
            let state = self.store.load()?;
            let start = self.start_phase(&state)?;
            info!(phase = start, "resuming orchestration");
            start
        } else {
            self.initialize().await?;
            0
        };

        let phase_count = self.engine.phase_count();
        let mut interrupted = false;

        for index in start..phase_count {
            if self.cancel.is_set() {
                interrupted = true;
                break;
            }
            match self.run_phase(index).await {
                Ok(()) => {
                    self.checkpoint_phase()?;
                }
                Err(e) => {
                    if matches!(
                        e.downcast_ref::<CompletionError>(),
                        Some(CompletionError::Interrupted)
                    ) {
                        interrupted = true;
                        break;
                    }
                    error!(phase = index, error = %e, "phase failed; state preserved");
                    return Err(e);
                }
            }
        }

        if interrupted {
            info!("run interrupted; progress is saved");
            return Ok(RunOutcome::Interrupted);
        }

        // Clean finish: settle every session and write a final checkpoint.
        let mut state = self.store.load()?;
        for session in &mut state.sessions {
            session.status = SessionStatus::Completed;
            session.current_task = None;
        }
        state.touch();
        self.store.save(&state)?;
        self.checkpoints.checkpoint(&state)?;
        info!("orchestration complete");
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasklist::Task;
    use std::path::Path;
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

    fn coordinator(dir: &Path, tasks: Vec<Task>, num_sessions: usize) -> SessionCoordinator {
        let ctx = FeatureContext::new(dir.to_path_buf(), "001-test");
        let config = FlowConfig {
            agent_type: "manual".into(),
            num_sessions,
        };
        let engine = DagEngine::from_tasks(tasks).unwrap();
        let mut coordinator =
            SessionCoordinator::new(ctx, config, engine, "main".to_string());
        coordinator.set_poll_interval(Duration::from_millis(10));
        coordinator
    }

    fn linear_tasks() -> Vec<Task> {
        vec![
            Task::new("T001", "First step"),
            Task::new("T002", "Second step").with_dependencies(vec!["T001".into()]),
            Task::new("T003", "Third step").with_dependencies(vec!["T002".into()]),
        ]
    }

    #[test]
    fn parse_phase_index_round_trips() {
        assert_eq!(parse_phase_index("phase-0"), Some(0));
        assert_eq!(parse_phase_index("phase-12"), Some(12));
        assert_eq!(parse_phase_index("wave-1"), None);
    }

    #[tokio::test]
    async fn initialize_creates_workspaces_and_state() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let mut coordinator = coordinator(dir.path(), linear_tasks(), 3);

        let state = coordinator.initialize().await.unwrap();

        // All three tasks serialize to session 0; sessions 1 and 2 have no
        // work and are skipped.
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions[0].branch_name, "impl-001-test-session-0");
        assert_eq!(state.tasks.len(), 3);
        assert!(dir.path().join(&state.sessions[0].worktree_path).exists());
        assert!(coordinator.store().exists());
    }

    #[tokio::test]
    async fn run_completes_linear_plan_with_presupplied_completions() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let mut coordinator = coordinator(dir.path(), linear_tasks(), 3);

        // Sentinels exist up front, so every wait returns on its first poll.
        let detector = CompletionDetector::new(
            FeatureContext::new(dir.path().to_path_buf(), "001-test").completions_dir(),
        );
        for id in ["T001", "T002", "T003"] {
            detector.mark_complete(id).unwrap();
        }

        let outcome = coordinator.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let state = coordinator.store().load().unwrap();
        assert_eq!(
            state.phases_completed,
            vec!["phase-0", "phase-1", "phase-2"]
        );
        assert!(state.all_tasks_completed());
        assert!(state.merge_status.is_none());
        for session in &state.sessions {
            assert_eq!(session.status, SessionStatus::Completed);
            assert!(session.current_task.is_none());
        }

        // One checkpoint per phase plus the final one.
        let checkpoints = CheckpointStore::new(
            FeatureContext::new(dir.path().to_path_buf(), "001-test").checkpoints_dir(),
        );
        assert_eq!(checkpoints.list().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_plan_completes_immediately() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let mut coordinator = coordinator(dir.path(), Vec::new(), 2);
        let outcome = coordinator.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        let state = coordinator.store().load().unwrap();
        assert!(state.sessions.is_empty());
        assert!(state.tasks.is_empty());
    }

    #[tokio::test]
    async fn interrupt_leaves_phase_in_progress_and_resume_finishes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let mut coordinator = coordinator(dir.path(), linear_tasks(), 1);

        let detector = CompletionDetector::new(
            FeatureContext::new(dir.path().to_path_buf(), "001-test").completions_dir(),
        );
        detector.mark_complete("T001").unwrap();

        // Interrupt once phase 0 is durably complete and phase 1 is waiting
        // on T002.
        let cancel = coordinator.cancel_token();
        let watch_store = StateStore::new(
            FeatureContext::new(dir.path().to_path_buf(), "001-test").state_path(),
        );
        tokio::spawn(async move {
            loop {
                if let Ok(state) = watch_store.load()
                    && state.phases_completed.contains(&"phase-0".to_string())
                    && state
                        .tasks
                        .get("T002")
                        .is_some_and(|t| t.status == TaskStatus::InProgress)
                {
                    cancel.set();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let outcome = coordinator.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Interrupted);

        let state = coordinator.store().load().unwrap();
        assert_eq!(state.current_phase, "phase-1");
        assert_eq!(state.phases_completed, vec!["phase-0"]);
        assert_eq!(
            state.tasks.get("T002").unwrap().status,
            TaskStatus::InProgress
        );

        // Complete the rest and resume with a fresh coordinator.
        detector.mark_complete("T002").unwrap();
        detector.mark_complete("T003").unwrap();
        let mut resumed = coordinator_for_resume(dir.path());
        let outcome = resumed.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let state = resumed.store().load().unwrap();
        assert_eq!(
            state.phases_completed,
            vec!["phase-0", "phase-1", "phase-2"]
        );
        assert!(state.all_tasks_completed());
    }

    fn coordinator_for_resume(dir: &Path) -> SessionCoordinator {
        coordinator(dir, linear_tasks(), 1)
    }

    #[tokio::test]
    async fn resume_after_completed_phase_starts_at_next() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let mut coordinator = coordinator(dir.path(), linear_tasks(), 1);
        let mut state = coordinator.initialize().await.unwrap();

        // Simulate a run that durably finished phase-0 and then stopped.
        state.current_phase = "phase-0".into();
        state.phases_completed = vec!["phase-0".into()];
        coordinator.store().save(&state).unwrap();
        assert_eq!(coordinator.start_phase(&state).unwrap(), 1);

        // An un-completed current phase resumes in place.
        state.phases_completed.clear();
        assert_eq!(coordinator.start_phase(&state).unwrap(), 0);
    }

    #[tokio::test]
    async fn fan_out_assigns_three_sessions() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let tasks = vec![
            Task::new("T001", "Root"),
            Task::new("T002", "A").with_dependencies(vec!["T001".into()]).parallel(),
            Task::new("T003", "B").with_dependencies(vec!["T001".into()]).parallel(),
            Task::new("T004", "C").with_dependencies(vec!["T001".into()]).parallel(),
            Task::new("T005", "Join")
                .with_dependencies(vec!["T002".into(), "T003".into(), "T004".into()]),
        ];
        let mut coordinator = coordinator(dir.path(), tasks, 3);
        let state = coordinator.initialize().await.unwrap();

        assert_eq!(state.sessions.len(), 3);
        assert_eq!(state.tasks.get("T003").unwrap().session, 1);
        assert_eq!(state.tasks.get("T004").unwrap().session, 2);
        assert_eq!(state.tasks.get("T005").unwrap().session, 0);
    }
}
