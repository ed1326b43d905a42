//! `speckit-flow status` — render the persisted orchestration state.

use crate::errors::StateError;
use crate::paths::FeatureContext;
use crate::state::StateStore;
use crate::ui;
use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    let store = StateStore::new(ctx.state_path());
    if !store.exists() {
        println!();
        println!("No orchestration in progress for '{}'.", ctx.feature);
        println!("Run 'speckit-flow run' to start one.");
        println!();
        return Ok(());
    }

    match store.load() {
        Ok(state) => {
            ui::print_status(&state);
            Ok(())
        }
        Err(e @ StateError::Corrupt { .. }) => Err(anyhow::Error::new(e).context(format!(
            "State file is corrupt. Restore a snapshot from {} over it.",
            ctx.checkpoints_dir().display()
        ))),
        Err(e) => Err(e.into()),
    }
}
