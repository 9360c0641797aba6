//! Project configuration file support for refine.
//!
//! Loads configuration from `refine.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use refine_core::LoopConfig;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "refine.toml";

/// Project-level configuration loaded from `refine.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Loop settings (iteration cap, threshold, timeout)
    #[serde(rename = "loop", default)]
    pub loop_config: LoopConfig,
    /// Command that produces/revises the artifact
    pub improver: Option<AgentCommand>,
    /// Command that scores the artifact
    pub evaluator: Option<AgentCommand>,
}

/// External program wired in as an agent
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgentCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if the file exists and parses
    /// - `Ok(None)` if the file does not exist
    /// - `Err(...)` if the file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}
