//! `speckit-flow init` — write the orchestrator configuration.

use crate::config::{DEFAULT_AGENT_TYPE, DEFAULT_NUM_SESSIONS, FlowConfig};
use crate::paths::FeatureContext;
use anyhow::{Context, Result, bail};
use dialoguer::Confirm;

pub fn run(sessions: Option<usize>, agent: Option<String>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    if !ctx.specs_dir().exists() {
        bail!(
            "No specs/ directory at {}. Create specs/<feature>/ with a tasks.md first.",
            ctx.specs_dir().display()
        );
    }

    let config_path = ctx.config_path();
    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "Configuration already exists at {}. Overwrite?",
                config_path.display()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !overwrite {
            println!("Keeping existing configuration.");
            return Ok(());
        }
    }

    let config = FlowConfig {
        agent_type: agent.unwrap_or_else(|| DEFAULT_AGENT_TYPE.to_string()),
        num_sessions: sessions.unwrap_or(DEFAULT_NUM_SESSIONS),
    };
    config.validate()?;

    ctx.ensure_speckit_dirs()?;
    config.save(&config_path)?;

    println!("Wrote {}", config_path.display());
    println!();
    println!("  agent_type:   {}", config.agent_type());
    println!("  num_sessions: {}", config.num_sessions);
    println!();
    println!("Next steps:");
    println!("  1. speckit-flow dag        # build the execution plan");
    println!("  2. speckit-flow run        # start the orchestration");
    Ok(())
}
