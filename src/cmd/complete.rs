//! `speckit-flow complete T###` — mark a task complete via sentinel file.

use crate::completion::CompletionDetector;
use crate::dag::DagArtifact;
use crate::paths::FeatureContext;
use crate::tasklist::is_valid_task_id;
use anyhow::{Context, Result, bail};
use console::style;

pub fn run(task_id: &str) -> Result<()> {
    if !is_valid_task_id(task_id) {
        bail!(
            "Invalid task id '{}': expected 'T' followed by exactly three digits, e.g. T042.",
            task_id
        );
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = FeatureContext::discover(&cwd)?;

    // With a plan on disk, reject ids that are not part of it.
    let dag_path = ctx.dag_path();
    if dag_path.exists() {
        let artifact = DagArtifact::load(&dag_path)?;
        if !artifact.contains_task(task_id) {
            bail!(
                "Task {} is not in the execution plan at {}.",
                task_id,
                dag_path.display()
            );
        }
    }

    let detector = CompletionDetector::new(ctx.completions_dir());
    if detector.mark_complete(task_id)? {
        println!("Marked {} complete.", style(task_id).green());
    } else {
        println!(
            "{} {} was already marked complete.",
            style("warning:").yellow(),
            task_id
        );
    }
    Ok(())
}
