//! Configuration for the SNAPPS workflow engine.
//!
//! Settings live in `snapps.json` (camelCase). Every field has a default, so a
//! missing file or a partial file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::WorkflowKind;
use crate::error::{Result, WorkflowError};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "snapps.json";

/// Default case file path.
fn default_case_file() -> String {
    "case.json".to_string()
}

/// Default output directory for reports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default oracle base URL.
fn default_base_url() -> String {
    "http://127.0.0.1:8787/api".to_string()
}

/// Default bound on one oracle round trip, in seconds.
const fn default_timeout_seconds() -> u64 {
    60
}

/// Default environment variable holding the bearer token.
fn default_token_env() -> String {
    "SNAPPS_ORACLE_TOKEN".to_string()
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Workflow to run.
    #[serde(default)]
    pub workflow: WorkflowKind,

    /// Path to the case file.
    #[serde(default = "default_case_file")]
    pub case_file: String,

    /// Output directory for generated reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Feedback oracle connection settings.
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow: WorkflowKind::default(),
            case_file: default_case_file(),
            output_dir: default_output_dir(),
            oracle: OracleConfig::default(),
        }
    }
}

/// Feedback oracle connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    /// Base URL; stage endpoints are `{baseUrl}/{workflow}/{stage}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bound on one round trip before it counts as unavailable.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Environment variable the bearer token is read from.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            token_env: default_token_env(),
        }
    }
}

impl OracleConfig {
    /// Returns the round-trip bound as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `snapps.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            WorkflowError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `snapps.json` from `dir`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::ConfigParse` for unreadable files, invalid JSON
    /// or unknown workflow names, and `WorkflowError::ConfigValidation` for
    /// invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(WorkflowError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| WorkflowError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::ConfigValidation` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.oracle.timeout_seconds == 0 {
            return Err(WorkflowError::config_validation(
                "oracle.timeoutSeconds must be greater than 0",
                "Set oracle.timeoutSeconds to at least 1 second in your snapps.json",
            ));
        }

        let base_url = self.oracle.base_url.trim();
        if base_url.is_empty() {
            return Err(WorkflowError::config_validation(
                "oracle.baseUrl must not be empty",
                "Provide the feedback service URL in your snapps.json",
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(WorkflowError::config_validation(
                format!("oracle.baseUrl '{base_url}' is not an http(s) URL"),
                "Use a URL starting with http:// or https://",
            ));
        }

        if self.oracle.token_env.trim().is_empty() {
            return Err(WorkflowError::config_validation(
                "oracle.tokenEnv must not be empty",
                "Name the environment variable that holds the bearer token",
            ));
        }

        if self.case_file.trim().is_empty() {
            return Err(WorkflowError::config_validation(
                "caseFile must not be empty",
                "Provide a valid case file path in your snapps.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(WorkflowError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your snapps.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }
}
