//! Orchestrator configuration (`.speckit/speckit-flow.yaml`).
//!
//! Two recognized keys: `agent_type` and `num_sessions`. Unknown keys are
//! accepted and ignored so the file can carry tool-specific extras. Defaults
//! are applied at decode time; range violations are rejected there too.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default adapter when the config does not name one.
pub const DEFAULT_AGENT_TYPE: &str = "copilot";

/// Default number of parallel sessions.
pub const DEFAULT_NUM_SESSIONS: usize = 3;

/// Maximum supported parallel sessions.
pub const MAX_SESSIONS: usize = 10;

/// Parsed orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowConfig {
    /// Which agent adapter drives the sessions.
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// How many parallel sessions to fan out across.
    #[serde(default = "default_num_sessions")]
    pub num_sessions: usize,
}

fn default_agent_type() -> String {
    DEFAULT_AGENT_TYPE.to_string()
}

fn default_num_sessions() -> usize {
    DEFAULT_NUM_SESSIONS
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            agent_type: default_agent_type(),
            num_sessions: default_num_sessions(),
        }
    }
}

impl FlowConfig {
    /// Load and validate configuration from `path`.
    ///
    /// A missing file is an error with a remediation hint; an empty file
    /// yields all defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "No configuration found at {}. Run 'speckit-flow init' to create it.",
                path.display()
            );
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Validate field ranges, normalizing `agent_type` whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.agent_type.trim().is_empty() {
            bail!("agent_type must be a non-empty string");
        }
        if self.num_sessions < 1 || self.num_sessions > MAX_SESSIONS {
            bail!(
                "num_sessions must be between 1 and {} (got {})",
                MAX_SESSIONS,
                self.num_sessions
            );
        }
        Ok(())
    }

    /// The configured adapter name, trimmed.
    pub fn agent_type(&self) -> &str {
        self.agent_type.trim()
    }
}
