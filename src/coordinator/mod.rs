//! Orchestration lifecycle: initialize, run phases, checkpoint, resume.

mod runner;

pub use runner::{RunOutcome, SessionCoordinator, parse_phase_index};
