use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{Error, Result};
use tracing::debug;

/// Tool configuration, loaded from `~/.nizima-fetch/config.toml` with
/// per-run CLI overrides applied on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Content store root the items are published under.
    pub output_dir: PathBuf,
    /// Whole-item admission gate for batch runs.
    pub item_concurrency: usize,
    /// Per-item task admission gate. Composes multiplicatively with the
    /// item gate.
    pub task_concurrency: usize,
    /// Download retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in seconds; doubles on each retry.
    pub retry_base_secs: u64,
    /// Attempt the export archive even when the catalog does not mark it
    /// downloadable.
    pub attempt_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("models/nizima"),
            item_concurrency: 3,
            task_concurrency: 5,
            max_retries: 3,
            retry_base_secs: 3,
            attempt_export: false,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".nizima-fetch"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!("config file not found; using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        fs::write(Self::config_path()?, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.retry_base_secs),
        }
    }
}
