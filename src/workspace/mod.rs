//! Isolated per-session working copies.

mod manager;

pub use manager::{
    WorktreeInfo, WorktreeManager, parse_worktree_list, session_branch, slugify,
};
