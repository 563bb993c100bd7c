//! Error types for the SNAPPS workflow engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, case loading, stage validation,
//! oracle round trips, and state machine transitions.

use std::path::PathBuf;

use crate::catalog::StageId;

/// A specialized `Result` type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors that can occur while driving a guided session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible so the front end can render them directly.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // ========================================================================
    // Stage Input Errors
    // ========================================================================
    /// The learner's input does not satisfy the stage's input requirement.
    ///
    /// Recovered locally; never reaches the network.
    #[error("Input for {stage} is incomplete: {message}\n\nSuggestion: {suggestion}")]
    Validation {
        /// Stage whose requirement failed.
        stage: StageId,
        /// What is missing from the input.
        message: String,
        /// What the learner should do.
        suggestion: String,
    },

    // ========================================================================
    // Oracle Errors
    // ========================================================================
    /// The bearer credential is missing, expired, or was rejected.
    #[error("Authentication failed: {message}\n\nSuggestion: Sign in again, then resubmit this stage")]
    Authentication {
        /// Details from the token provider or the oracle.
        message: String,
    },

    /// The feedback oracle could not be reached or returned a non-2xx status.
    #[error("Feedback service unavailable for {stage}: {message}\n\nSuggestion: Your answer was kept; try submitting again")]
    OracleUnavailable {
        /// Stage being submitted.
        stage: StageId,
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Transport or status details.
        message: String,
    },

    /// The oracle responded, but the body violates the stage contract.
    #[error("Unexpected feedback for {stage}: {message}\n\nSuggestion: Your answer was kept; try again, and report the problem if it persists")]
    OracleContract {
        /// Stage being submitted.
        stage: StageId,
        /// Description of the shape violation.
        message: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// A stage index outside the catalog was requested.
    #[error("Stage index {index} is out of range (catalog has {count} stages)")]
    StageOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of stages in the catalog.
        count: usize,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your snapps.json with a JSON linter")]
    ConfigParse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Case Loading Errors
    // ========================================================================
    /// Case file was not found at the specified path.
    #[error("Case not found: '{path}'\n\nSuggestion: Check the 'caseFile' field in snapps.json or pass the case path explicitly")]
    CaseNotFound {
        /// Path where the case was expected.
        path: PathBuf,
    },

    /// Case file exceeds the size limit.
    #[error("Case file exceeds size limit (64KB): '{path}' is {size_kb}KB\n\nSuggestion: Trim attachments or free-text notes from the case")]
    CaseTooLarge {
        /// Path to the oversized case.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Case file contains non-UTF-8 content.
    #[error("Case has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    CaseEncoding {
        /// Path to the case with encoding issues.
        path: PathBuf,
    },

    /// Case file is not a valid case description.
    #[error("Invalid case file '{path}': {message}")]
    CaseParse {
        /// Path to the case file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Creates a new `Validation` error for the given stage.
    #[must_use]
    pub fn validation(
        stage: StageId,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            stage,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Authentication` error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new `OracleUnavailable` error.
    #[must_use]
    pub fn oracle_unavailable(
        stage: StageId,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::OracleUnavailable {
            stage,
            status,
            message: message.into(),
        }
    }

    /// Creates a new `OracleContract` error.
    #[must_use]
    pub fn oracle_contract(stage: StageId, message: impl Into<String>) -> Self {
        Self::OracleContract {
            stage,
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `ConfigParse` error with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidation` error with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `CaseNotFound` error.
    #[must_use]
    pub fn case_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CaseNotFound { path: path.into() }
    }

    /// Creates a new `CaseTooLarge` error.
    #[must_use]
    pub fn case_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::CaseTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `CaseEncoding` error.
    #[must_use]
    pub fn case_encoding(path: impl Into<PathBuf>) -> Self {
        Self::CaseEncoding { path: path.into() }
    }

    /// Creates a new `CaseParse` error.
    #[must_use]
    pub fn case_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CaseParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if resubmitting the same stage may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::OracleUnavailable { .. })
    }

    /// Returns `true` if the learner must sign in again before resubmitting.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this error should be shown to the learner.
    ///
    /// Wiring errors are logged instead.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTransition { .. } | Self::StageOutOfRange { .. }
        )
    }

    /// Returns `true` if this error came from an oracle round trip.
    #[must_use]
    pub const fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::OracleUnavailable { .. } | Self::OracleContract { .. }
        )
    }
}
