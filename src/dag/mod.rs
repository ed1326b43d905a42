//! Execution planning: dependency graph, phases, and session assignment.
//!
//! The DAG engine turns the flat task list into an execution plan in three
//! steps:
//!
//! 1. **Builder** - constructs a validated graph (no duplicates, no unknown
//!    dependencies, no cycles)
//! 2. **Engine** - computes dependency generations, the critical path, and
//!    the per-task session assignment
//! 3. **Artifact** - serializes the plan to `dag.yaml` for external
//!    consumers and later runs
//!
//! ## Example
//!
//! ```no_run
//! use speckit_flow::dag::DagEngine;
//! use speckit_flow::tasklist::Task;
//!
//! # fn example() -> Result<(), speckit_flow::errors::DagError> {
//! let tasks = vec![
//!     Task::new("T001", "Scaffolding"),
//!     Task::new("T002", "API layer").with_dependencies(vec!["T001".into()]).parallel(),
//!     Task::new("T003", "Data layer").with_dependencies(vec!["T001".into()]).parallel(),
//! ];
//!
//! let mut engine = DagEngine::from_tasks(tasks)?;
//! engine.assign_sessions(2);
//! // Phase 0: [T001] -> session 0
//! // Phase 1: [T002, T003] -> sessions 0 and 1
//! # Ok(())
//! # }
//! ```

mod artifact;
mod builder;
mod engine;

pub use artifact::{ARTIFACT_VERSION, ArtifactPhase, DagArtifact};
pub use builder::{DagBuilder, TaskGraph, TaskIndex};
pub use engine::{DagEngine, phase_name};
