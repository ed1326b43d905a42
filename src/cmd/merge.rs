//! `speckit-flow merge` — integrate session branches after orchestration.

use crate::errors::StateError;
use crate::merge::MergeIntegrator;
use crate::paths::FeatureContext;
use crate::state::{MergeStatus, StateStore};
use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Confirm;

fn set_merge_status(store: &StateStore, status: MergeStatus) {
    if let Ok(mut state) = store.load() {
        state.merge_status = Some(status);
        state.touch();
        let _ = store.save(&state);
    }
}

pub async fn run(keep_worktrees: bool, test_command: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    let store = StateStore::new(ctx.state_path());
    let state = match store.load() {
        Ok(state) => state,
        Err(StateError::NotFound { .. }) => {
            bail!(
                "No orchestration state for '{}'. Run 'speckit-flow run' before merging.",
                ctx.feature
            );
        }
        Err(e) => return Err(e.into()),
    };

    let integrator =
        MergeIntegrator::new(ctx.repo_root.clone(), &state.spec_id, &state.base_branch);

    let analysis = integrator.analyze()?;
    println!(
        "{} session branch(es), {} file(s) changed in total.",
        analysis.sessions.len(),
        analysis.total_files_changed
    );

    if !analysis.safe_to_merge {
        println!();
        println!(
            "{} These files were modified by more than one session:",
            style("warning:").yellow().bold()
        );
        for (path, sessions) in &analysis.overlapping_files {
            let ids: Vec<String> = sessions.iter().map(|s| s.to_string()).collect();
            println!("  {} (sessions {})", path, ids.join(", "));
        }
        println!();
        let proceed = Confirm::new()
            .with_prompt("Overlapping changes may conflict. Merge anyway?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !proceed {
            println!("Merge cancelled.");
            return Ok(());
        }
    }

    set_merge_status(&store, MergeStatus::InProgress);

    let result = match integrator.merge_sequential(None).await {
        Ok(result) => result,
        Err(e) => {
            set_merge_status(&store, MergeStatus::Failed);
            return Err(e);
        }
    };

    if !result.success {
        set_merge_status(&store, MergeStatus::Failed);
        let session = result
            .conflict_session
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!();
        println!(
            "{} Merge conflict at session {}.",
            style("✗").red().bold(),
            session
        );
        for path in &result.conflicting_files {
            println!("  conflicted: {}", path);
        }
        println!(
            "The integration branch was removed and the working copy is back on '{}'.",
            state.base_branch
        );
        bail!(
            "Resolve the overlap between sessions (see files above) and re-run 'speckit-flow merge'."
        );
    }

    println!(
        "{} Merged sessions {:?} into '{}'.",
        style("✓").green().bold(),
        result.merged_sessions,
        result.integration_branch
    );

    if let Some(command) = test_command.as_deref() {
        let (ok, output) = integrator.validate(Some(command)).await?;
        if ok {
            println!("{} Validation passed.", style("✓").green());
        } else {
            // Validation failure is a warning: the merged branch stays for
            // inspection.
            println!(
                "{} Validation command failed:\n{}",
                style("warning:").yellow().bold(),
                output.trim()
            );
        }
    }

    let summary = integrator.finalize(keep_worktrees).await?;
    set_merge_status(&store, MergeStatus::Completed);

    println!();
    println!(
        "{} files changed, +{} -{} lines on '{}'; {} workspace(s) removed.",
        summary.files_changed,
        summary.lines_added,
        summary.lines_deleted,
        summary.integration_branch,
        summary.workspaces_removed
    );
    Ok(())
}
