//! `speckit-flow run` — full orchestration, resuming any saved run.

use crate::config::FlowConfig;
use crate::coordinator::{RunOutcome, SessionCoordinator};
use crate::dag::DagEngine;
use crate::paths::FeatureContext;
use crate::state::StateStore;
use crate::tasklist::parse_tasks;
use crate::ui::Dashboard;
use anyhow::{Context, Result, bail};
use console::style;
use git2::Repository;

/// Current branch name, for `base_branch` on a fresh run.
fn current_branch(ctx: &FeatureContext) -> Result<String> {
    let repo = Repository::open(&ctx.repo_root).context("Failed to open git repository")?;
    let head = repo.head().context("Failed to read HEAD")?;
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("HEAD is detached; check out a branch before running"))
}

pub async fn run(
    sessions: Option<usize>,
    resume: bool,
    dashboard_enabled: bool,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    let mut config = FlowConfig::load(&ctx.config_path())?;
    if let Some(n) = sessions {
        config.num_sessions = n;
        config.validate()?;
    }

    let tasks_path = ctx.tasks_path();
    if !tasks_path.exists() {
        bail!(
            "No task list at {}. Create it before running.",
            tasks_path.display()
        );
    }
    let contents = std::fs::read_to_string(&tasks_path)
        .with_context(|| format!("Failed to read {}", tasks_path.display()))?;
    let engine = DagEngine::from_tasks(parse_tasks(&contents)?)?;

    let store = StateStore::new(ctx.state_path());
    if store.exists() && !resume {
        println!(
            "Found saved progress for '{}'; resuming it. Use 'speckit-flow abort' to start over.",
            ctx.feature
        );
    }

    let base_branch = current_branch(&ctx)?;
    let mut coordinator = SessionCoordinator::new(ctx, config, engine, base_branch);

    let dashboard = (dashboard_enabled && console::Term::stdout().is_term())
        .then(|| Dashboard::spawn(coordinator.store().clone()));

    let outcome = coordinator.run().await;

    if let Some(dashboard) = dashboard {
        dashboard.stop().await;
    }

    match outcome? {
        RunOutcome::Completed => {
            println!();
            println!("{} All phases complete.", style("✓").green().bold());
            println!("Next: 'speckit-flow merge' to integrate the session branches.");
            Ok(())
        }
        RunOutcome::Interrupted => {
            println!();
            println!(
                "{} Interrupted. Progress is saved; 'speckit-flow run' resumes where you left off.",
                style("◼").yellow().bold()
            );
            Ok(())
        }
    }
}
