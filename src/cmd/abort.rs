//! `speckit-flow abort` — destroy workspaces and state, preserving branches.

use crate::paths::FeatureContext;
use crate::state::StateStore;
use crate::workspace::WorktreeManager;
use anyhow::{Context, Result};
use dialoguer::Confirm;

pub async fn run(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    let store = StateStore::new(ctx.state_path());
    let worktrees = WorktreeManager::new(ctx.repo_root.clone());
    let workspaces = worktrees
        .spec_workspaces(&ctx.feature)
        .await
        .unwrap_or_default();

    if !store.exists() && workspaces.is_empty() {
        println!("Nothing to clean up for '{}'.", ctx.feature);
        return Ok(());
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Abort '{}': remove {} workspace(s) and the orchestration state? \
                 Session branches are preserved.",
                ctx.feature,
                workspaces.len()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Abort cancelled.");
            return Ok(());
        }
    }

    let removed = worktrees.cleanup_spec(&ctx.feature).await?;
    store.delete()?;

    println!(
        "Removed {} workspace(s) and the orchestration state. \
         Session branches are preserved for recovery.",
        removed
    );
    Ok(())
}
