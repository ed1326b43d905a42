//! Durable orchestration state: the live document and its checkpoints.

mod checkpoint;
mod model;
mod store;

pub use checkpoint::{CheckpointStore, DEFAULT_CHECKPOINT_RETENTION};
pub use model::{
    MergeStatus, OrchestrationState, STATE_VERSION, SessionState, SessionStatus, TaskState,
    TaskStatus,
};
pub use store::StateStore;
