//! Durable, crash-safe access to the orchestration state document.
//!
//! Writers serialize on an advisory lock over a sibling `.lock` file, and
//! every save goes through write-temp / fsync / rename so readers only ever
//! observe a complete document. The rename is the commit point: a crash at
//! any earlier moment leaves the prior state intact.

use crate::errors::StateError;
use crate::state::model::OrchestrationState;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Bound on lock acquisition before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between lock attempts.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive-access guard over the store's lock file. Released on drop.
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Single-writer store for [`OrchestrationState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
}

impl StateStore {
    /// Create a store over the canonical state path.
    pub fn new(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    /// Path of the state document.
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .state_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "flow-state.yaml".to_string());
        name.push_str(".lock");
        self.state_path.with_file_name(name)
    }

    /// Check whether a state document exists.
    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }

    /// Load the current state.
    pub fn load(&self) -> Result<OrchestrationState, StateError> {
        let contents = match fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    path: self.state_path.clone(),
                });
            }
            Err(e) => {
                return Err(StateError::Io {
                    path: self.state_path.clone(),
                    source: e,
                });
            }
        };
        serde_yaml::from_str(&contents).map_err(|source| StateError::Corrupt {
            path: self.state_path.clone(),
            source,
        })
    }

    /// Atomically persist `state`, serialized with other writers.
    pub fn save(&self, state: &OrchestrationState) -> Result<(), StateError> {
        let _lock = self.acquire_lock()?;
        self.write_atomic(state)
    }

    /// Remove the state document and its lock file.
    pub fn delete(&self) -> Result<(), StateError> {
        for path in [self.state_path.clone(), self.lock_path()] {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(StateError::Io { path, source: e });
            }
        }
        Ok(())
    }

    /// Acquire the advisory lock, waiting up to [`LOCK_TIMEOUT`].
    fn acquire_lock(&self) -> Result<StoreLock, StateError> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StateError::Io {
                path: lock_path.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { file }),
                Err(_) if start.elapsed() < LOCK_TIMEOUT => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(_) => {
                    return Err(StateError::LockTimeout {
                        path: lock_path,
                        waited_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Write-temp / fsync / rename. The rename is the commit point.
    fn write_atomic(&self, state: &OrchestrationState) -> Result<(), StateError> {
        let yaml = serde_yaml::to_string(state).map_err(|source| StateError::Corrupt {
            path: self.state_path.clone(),
            source,
        })?;

        let dir = self
            .state_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StateError::Io {
            path: dir.clone(),
            source,
        })?;

        let tmp_path = dir.join(format!(
            ".{}.tmp.{}",
            self.state_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "flow-state.yaml".to_string()),
            std::process::id()
        ));

        let result = (|| {
            let mut tmp = File::create(&tmp_path).map_err(|source| StateError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            tmp.write_all(yaml.as_bytes())
                .map_err(|source| StateError::Io {
                    path: tmp_path.clone(),
                    source,
                })?;
            tmp.sync_all().map_err(|source| StateError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            fs::rename(&tmp_path, &self.state_path).map_err(|source| StateError::Io {
                path: self.state_path.clone(),
                source,
            })
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}
