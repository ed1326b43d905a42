//! Serialized execution plan (`specs/<feature>/dag.yaml`).
//!
//! The artifact exists for external consumers and for the `complete` command
//! to validate ids against; the coordinator rebuilds its engine from it at
//! run time. Round-tripping preserves every task field including session
//! assignment.

use crate::dag::engine::{DagEngine, phase_name};
use crate::errors::DagError;
use crate::tasklist::Task;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema version written into the artifact.
pub const ARTIFACT_VERSION: &str = "1.0";

/// One phase of the serialized plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactPhase {
    /// `phase-<i>`.
    pub name: String,
    /// Tasks in intra-phase (sorted) order.
    pub tasks: Vec<Task>,
}

/// The on-disk execution plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DagArtifact {
    pub version: String,
    pub spec_id: String,
    pub generated_at: DateTime<Utc>,
    pub num_sessions: usize,
    pub phases: Vec<ArtifactPhase>,
}

impl DagArtifact {
    /// Capture an engine's plan for serialization.
    pub fn from_engine(engine: &DagEngine, spec_id: &str, num_sessions: usize) -> Self {
        let phases = engine
            .phases()
            .iter()
            .enumerate()
            .map(|(i, ids)| ArtifactPhase {
                name: phase_name(i),
                tasks: ids
                    .iter()
                    .filter_map(|id| engine.graph().get_by_id(id))
                    .cloned()
                    .collect(),
            })
            .collect();

        Self {
            version: ARTIFACT_VERSION.to_string(),
            spec_id: spec_id.to_string(),
            generated_at: Utc::now(),
            num_sessions,
            phases,
        }
    }

    /// Write the artifact to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize DAG artifact")?;
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load an artifact from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "No DAG artifact at {}. Run 'speckit-flow dag' first.",
                path.display()
            );
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let artifact: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if artifact.version != ARTIFACT_VERSION {
            bail!(
                "Unsupported DAG artifact version '{}' at {} (expected {})",
                artifact.version,
                path.display(),
                ARTIFACT_VERSION
            );
        }
        Ok(artifact)
    }

    /// All task ids in the plan, in phase order.
    pub fn task_ids(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|phase| phase.tasks.iter().map(|t| t.id.clone()))
            .collect()
    }

    /// Check whether the plan contains `id`.
    pub fn contains_task(&self, id: &str) -> bool {
        self.phases
            .iter()
            .any(|phase| phase.tasks.iter().any(|t| t.id == id))
    }

    /// Rebuild an engine from the flattened tasks. Phase computation is
    /// deterministic, so the rebuilt engine reproduces the serialized phases.
    pub fn to_engine(&self) -> Result<DagEngine, DagError> {
        let tasks: Vec<Task> = self
            .phases
            .iter()
            .flat_map(|phase| phase.tasks.iter().cloned())
            .collect();
        DagEngine::from_tasks(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_engine() -> DagEngine {
        let mut engine = DagEngine::from_tasks(vec![
            Task::new("T001", "Bootstrap"),
            Task::new("T002", "Left leg")
                .with_dependencies(vec!["T001".into()])
                .parallel(),
            Task::new("T003", "Right leg")
                .with_dependencies(vec!["T001".into()])
                .parallel(),
        ])
        .unwrap();
        engine.assign_sessions(2);
        engine
    }

    #[test]
    fn artifact_captures_phases_and_assignments() {
        let artifact = DagArtifact::from_engine(&sample_engine(), "001-api", 2);
        assert_eq!(artifact.version, ARTIFACT_VERSION);
        assert_eq!(artifact.phases.len(), 2);
        assert_eq!(artifact.phases[0].name, "phase-0");
        assert_eq!(artifact.phases[1].tasks[0].session, Some(0));
        assert_eq!(artifact.phases[1].tasks[1].session, Some(1));
    }

    #[test]
    fn save_load_round_trips_all_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dag.yaml");
        let artifact = DagArtifact::from_engine(&sample_engine(), "001-api", 2);
        artifact.save(&path).unwrap();

        let loaded = DagArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn rebuilt_engine_reproduces_phases() {
        let artifact = DagArtifact::from_engine(&sample_engine(), "001-api", 2);
        let engine = artifact.to_engine().unwrap();
        assert_eq!(engine.phases().len(), artifact.phases.len());
        for (i, phase) in artifact.phases.iter().enumerate() {
            let ids: Vec<String> = phase.tasks.iter().map(|t| t.id.clone()).collect();
            assert_eq!(engine.phase_tasks(i).unwrap(), ids.as_slice());
        }
        assert_eq!(engine.get_task("T003").unwrap().session, Some(1));
    }

    #[test]
    fn missing_artifact_has_remediation_hint() {
        let dir = tempdir().unwrap();
        let err = DagArtifact::load(&dir.path().join("dag.yaml")).unwrap_err();
        assert!(err.to_string().contains("speckit-flow dag"));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dag.yaml");
        let mut artifact = DagArtifact::from_engine(&sample_engine(), "001-api", 2);
        artifact.version = "9.9".into();
        let yaml = serde_yaml::to_string(&artifact).unwrap();
        std::fs::write(&path, yaml).unwrap();
        assert!(DagArtifact::load(&path).is_err());
    }

    #[test]
    fn membership_lookup() {
        let artifact = DagArtifact::from_engine(&sample_engine(), "001-api", 2);
        assert!(artifact.contains_task("T002"));
        assert!(!artifact.contains_task("T099"));
        assert_eq!(artifact.task_ids(), vec!["T001", "T002", "T003"]);
    }
}
