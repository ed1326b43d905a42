//! `speckit-flow dag` — build and serialize the execution plan.

use crate::config::{FlowConfig, MAX_SESSIONS};
use crate::dag::{DagArtifact, DagEngine};
use crate::paths::FeatureContext;
use crate::tasklist::parse_tasks;
use crate::ui;
use anyhow::{Context, Result, bail};

pub fn run(sessions: Option<usize>, visualize: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    let num_sessions = match sessions {
        Some(n) => {
            if n < 1 || n > MAX_SESSIONS {
                bail!("--sessions must be between 1 and {} (got {})", MAX_SESSIONS, n);
            }
            n
        }
        // The plan can be built without a config file; fall back to defaults.
        None => FlowConfig::load(&ctx.config_path())
            .map(|c| c.num_sessions)
            .unwrap_or_else(|_| FlowConfig::default().num_sessions),
    };

    let tasks_path = ctx.tasks_path();
    if !tasks_path.exists() {
        bail!(
            "No task list at {}. Create it with one '- [ ] [T###] ...' line per task.",
            tasks_path.display()
        );
    }
    let contents = std::fs::read_to_string(&tasks_path)
        .with_context(|| format!("Failed to read {}", tasks_path.display()))?;
    let tasks = parse_tasks(&contents)?;

    let mut engine = DagEngine::from_tasks(tasks)?;
    engine.assign_sessions(num_sessions);

    let artifact = DagArtifact::from_engine(&engine, &ctx.feature, num_sessions);
    let dag_path = ctx.dag_path();
    artifact.save(&dag_path)?;
    println!(
        "Wrote {} ({} tasks across {} phases)",
        dag_path.display(),
        engine.task_count(),
        engine.phase_count()
    );

    if visualize {
        ui::print_plan(&engine, num_sessions);
    }
    Ok(())
}
