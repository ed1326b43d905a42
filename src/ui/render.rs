//! Terminal rendering of plans and state.
//!
//! Pure consumers of the DAG engine and the persisted state document; no
//! rendering code mutates anything.

use crate::dag::{DagEngine, phase_name};
use crate::state::{OrchestrationState, SessionStatus, TaskStatus};
use console::style;

fn status_label(status: TaskStatus) -> console::StyledObject<&'static str> {
    match status {
        TaskStatus::Pending => style("pending").dim(),
        TaskStatus::InProgress => style("in progress").yellow(),
        TaskStatus::Completed => style("completed").green(),
        TaskStatus::Failed => style("failed").red(),
    }
}

fn session_label(status: SessionStatus) -> console::StyledObject<&'static str> {
    match status {
        SessionStatus::Idle => style("idle").dim(),
        SessionStatus::Executing => style("executing").yellow(),
        SessionStatus::Waiting => style("waiting").cyan(),
        SessionStatus::Completed => style("completed").green(),
        SessionStatus::Failed => style("failed").red(),
    }
}

/// Print the current orchestration state.
pub fn print_status(state: &OrchestrationState) {
    println!();
    println!("{}", style("Orchestration Status").bold());
    println!("{}", style("====================").bold());
    println!();
    println!("Spec:          {}", state.spec_id);
    println!("Agent:         {}", state.agent_type);
    println!("Base branch:   {}", state.base_branch);
    println!("Sessions:      {}", state.num_sessions);
    println!("Current phase: {}", state.current_phase);
    println!(
        "Completed:     {}",
        if state.phases_completed.is_empty() {
            "none".to_string()
        } else {
            state.phases_completed.join(", ")
        }
    );
    if let Some(merge) = state.merge_status {
        println!("Merge:         {:?}", merge);
    }

    println!();
    println!("{}", style("Sessions").bold());
    for session in &state.sessions {
        let current = session
            .current_task
            .as_deref()
            .map(|id| format!(" -> {}", id))
            .unwrap_or_default();
        println!(
            "  [{}] {} {}{} ({} done)",
            session.session_id,
            session_label(session.status),
            session.branch_name,
            current,
            session.completed_tasks.len()
        );
    }

    println!();
    println!("{}", style("Tasks").bold());
    for (id, task) in &state.tasks {
        println!(
            "  {} {} (session {})",
            id,
            status_label(task.status),
            task.session
        );
    }

    let done = state.count_tasks(TaskStatus::Completed);
    println!();
    println!("{}/{} tasks completed", done, state.tasks.len());
    println!();
}

/// Print the phase tree with session assignments and the critical path.
pub fn print_plan(engine: &DagEngine, num_sessions: usize) {
    println!();
    println!(
        "{} ({} tasks, {} phases, {} sessions)",
        style("Execution Plan").bold(),
        engine.task_count(),
        engine.phase_count(),
        num_sessions
    );
    println!();

    for (i, ids) in engine.phases().iter().enumerate() {
        println!("{}", style(phase_name(i)).cyan().bold());
        for (k, id) in ids.iter().enumerate() {
            let Ok(task) = engine.get_task(id) else {
                continue;
            };
            let connector = if k + 1 == ids.len() { "└─" } else { "├─" };
            let mut markers = String::new();
            if task.parallelizable {
                markers.push_str(" [P]");
            }
            if let Some(story) = &task.story {
                markers.push_str(&format!(" [{}]", story));
            }
            let session = task
                .session
                .map(|s| format!("session {}", s))
                .unwrap_or_else(|| "unassigned".to_string());
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!("  (after {})", task.dependencies.join(", "))
            };
            println!(
                "  {} {}{} {} {}{}",
                connector,
                style(id).green(),
                markers,
                task.name,
                style(session).dim(),
                style(deps).dim()
            );
        }
    }

    let critical = engine.critical_path();
    if !critical.is_empty() {
        println!();
        println!(
            "Critical path ({} tasks): {}",
            critical.len(),
            critical.join(" -> ")
        );
    }
    println!();
}
