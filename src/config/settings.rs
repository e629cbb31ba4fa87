//! Configuration settings and validation.

use std::path::PathBuf;
use std::time::Duration;

use crate::watcher::{IgnoreBackend, OracleFailure};
use crate::{Error, Result};

/// Quiet period after the last change before a batch is flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(60);

/// Main configuration for a watch session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace root to watch.
    pub workspace: PathBuf,

    /// Supported file extensions (`.go`, `py`, ...).
    ///
    /// Empty means every extension of the registered languages.
    pub extensions: Vec<String>,

    /// Quiet period before pending changes are flushed.
    pub debounce: Duration,

    /// How ignore status is decided.
    pub ignore_backend: IgnoreBackend,

    /// What an ignore check failure resolves to.
    pub oracle_failure: OracleFailure,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON logs.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            extensions: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            ignore_backend: IgnoreBackend::default(),
            oracle_failure: OracleFailure::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.workspace.as_os_str().is_empty() {
            return Err(Error::config("workspace cannot be empty"));
        }

        if self.debounce.is_zero() {
            return Err(Error::config("debounce cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if let Some(ext) = self
            .extensions
            .iter()
            .find(|e| e.trim_start_matches('.').is_empty() || e.contains('/'))
        {
            return Err(Error::config(format!("invalid extension '{ext}'")));
        }

        Ok(())
    }

    /// Resolve the workspace to an absolute, canonical path.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace does not exist.
    pub fn workspace_root(&self) -> Result<PathBuf> {
        Ok(self.workspace.canonicalize()?)
    }
}
