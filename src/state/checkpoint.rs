//! Append-only snapshots of orchestration state.
//!
//! Each checkpoint is an independent YAML file under
//! `.speckit/checkpoints/`, named by its UTC timestamp with `:` normalized
//! to `-` so the name is filesystem-safe and lexicographically ordered by
//! time. Snapshots are written at phase boundaries, so none ever records a
//! mid-phase partial state.

use crate::errors::StateError;
use crate::state::model::OrchestrationState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// How many snapshots `prune` keeps by default.
pub const DEFAULT_CHECKPOINT_RETENTION: usize = 10;

/// Store for timestamped state snapshots.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store over the checkpoint directory.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_name(at: DateTime<Utc>) -> String {
        format!("{}.yaml", at.format("%Y-%m-%dT%H-%M-%SZ"))
    }

    /// Write a snapshot of `state` and return its path.
    ///
    /// Names have one-second resolution; a second snapshot within the same
    /// second takes the next free timestamp so history stays append-only.
    pub fn checkpoint(&self, state: &OrchestrationState) -> Result<PathBuf, StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut at = Utc::now();
        let mut path = self.dir.join(Self::snapshot_name(at));
        while path.exists() {
            at += ChronoDuration::seconds(1);
            path = self.dir.join(Self::snapshot_name(at));
        }

        let yaml = serde_yaml::to_string(state).map_err(|source| StateError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, yaml).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, StateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut snapshots: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        // Timestamp names sort lexicographically; newest first.
        snapshots.sort();
        snapshots.reverse();
        Ok(snapshots)
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>, StateError> {
        Ok(self.list()?.into_iter().next())
    }

    /// Load a specific snapshot.
    pub fn restore(&self, path: &Path) -> Result<OrchestrationState, StateError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_yaml::from_str(&contents).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Delete all but the `keep` most recent snapshots; returns how many
    /// were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, StateError> {
        let snapshots = self.list()?;
        let mut removed = 0;
        for path in snapshots.into_iter().skip(keep) {
            fs::remove_file(&path).map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state(phase: &str) -> OrchestrationState {
        let mut state = OrchestrationState::new("001-api", "copilot", 2, "main");
        state.current_phase = phase.to_string();
        state
    }

    #[test]
    fn checkpoint_writes_timestamped_yaml() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));
        let path = store.checkpoint(&sample_state("phase-0")).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("Z.yaml"), "{}", name);
        assert!(!name.contains(':'));
        assert!(path.exists());
    }

    #[test]
    fn same_second_checkpoints_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        let a = store.checkpoint(&sample_state("phase-0")).unwrap();
        let b = store.checkpoint(&sample_state("phase-1")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn list_orders_newest_first() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        // Write out-of-order names directly; list() sorts by name.
        for name in [
            "2026-01-02T00-00-00Z.yaml",
            "2026-01-01T00-00-00Z.yaml",
            "2026-01-03T00-00-00Z.yaml",
        ] {
            let yaml = serde_yaml::to_string(&sample_state("phase-0")).unwrap();
            fs::write(dir.path().join(name), yaml).unwrap();
        }
        let listed = store.list().unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "2026-01-03T00-00-00Z.yaml",
                "2026-01-02T00-00-00Z.yaml",
                "2026-01-01T00-00-00Z.yaml",
            ]
        );
        assert_eq!(store.latest().unwrap().unwrap(), listed[0]);
    }

    #[test]
    fn restore_round_trips_state() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        let state = sample_state("phase-2");
        let path = store.checkpoint(&state).unwrap();
        assert_eq!(store.restore(&path).unwrap(), state);
    }

    #[test]
    fn restore_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        let result = store.restore(&dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(StateError::NotFound { .. })));
    }

    #[test]
    fn prune_keeps_newest() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        for i in 0..5 {
            let name = format!("2026-01-0{}T00-00-00Z.yaml", i + 1);
            let yaml = serde_yaml::to_string(&sample_state(&format!("phase-{}", i))).unwrap();
            fs::write(dir.path().join(name), yaml).unwrap();
        }

        let removed = store.prune(2).unwrap();
        assert_eq!(removed, 3);

        let survivors = store.list().unwrap();
        assert_eq!(survivors.len(), 2);
        let newest = survivors[0].file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(newest, "2026-01-05T00-00-00Z.yaml");
    }

    #[test]
    fn empty_store_lists_nothing() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());
        assert_eq!(store.prune(DEFAULT_CHECKPOINT_RETENTION).unwrap(), 0);
    }
}
