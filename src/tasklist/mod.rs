//! Task-list ingestion.
//!
//! The feature's `tasks.md` is the single human-authored input: one checkbox
//! line per task, with optional parallelism, story, and dependency markers.
//! This module owns the `Task` value type and the line grammar; the DAG
//! engine consumes the parsed list, and the completion detector re-reads the
//! same grammar to observe checkbox transitions.

mod parser;
mod types;

pub use parser::{completed_ids, parse_task_line, parse_tasks};
pub use types::{Task, is_valid_task_id};
