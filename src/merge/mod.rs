//! Merge integration of session branches.

mod integrator;

pub use integrator::{
    MergeAnalysis, MergeIntegrator, MergeResult, MergeSummary, SessionChanges,
    integration_branch,
};
