//! Boundary to the external feedback oracle.
//!
//! The orchestrator talks to the oracle only through the [`FeedbackOracle`]
//! trait. [`HttpOracleGateway`] is the production implementation; tests
//! substitute scripted fakes.
//!
//! - [`request`] builds the stage-specific request body
//! - [`response`] folds the oracle's heterogeneous answers into a [`FeedbackRecord`]
//! - [`token`] supplies bearer credentials

pub mod http;
pub mod request;
pub mod response;
pub mod token;

use async_trait::async_trait;

use crate::catalog::StageId;
use crate::error::WorkflowError;
use crate::feedback::FeedbackRecord;
use crate::session::{SessionState, StageSubmission};

pub use http::HttpOracleGateway;
pub use request::{OracleRequest, PriorResponse, StagePayload};
pub use response::normalize_response;
pub use token::{EnvToken, StaticToken, TokenProvider};

/// Failures of a single oracle round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Credential missing, blank, expired, or rejected by the oracle.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Details.
        message: String,
    },

    /// Transport failure, timeout, or non-2xx status.
    #[error("oracle unavailable for {stage}: {message}")]
    Unavailable {
        /// Stage being submitted.
        stage: StageId,
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Details.
        message: String,
    },

    /// The response body does not match the stage contract.
    #[error("oracle contract violated for {stage}: {message}")]
    Contract {
        /// Stage being submitted.
        stage: StageId,
        /// Details.
        message: String,
    },
}

impl OracleError {
    /// Creates an `Authentication` error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(stage: StageId, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            stage,
            status,
            message: message.into(),
        }
    }

    /// Creates a `Contract` error.
    #[must_use]
    pub fn contract(stage: StageId, message: impl Into<String>) -> Self {
        Self::Contract {
            stage,
            message: message.into(),
        }
    }
}

impl From<OracleError> for WorkflowError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Authentication { message } => Self::authentication(message),
            OracleError::Unavailable {
                stage,
                status,
                message,
            } => Self::oracle_unavailable(stage, status, message),
            OracleError::Contract { stage, message } => Self::oracle_contract(stage, message),
        }
    }
}

/// Result of one oracle round trip.
pub type OracleResult = std::result::Result<FeedbackRecord, OracleError>;

/// The external feedback service.
///
/// Given a drafted submission and a snapshot of the session it belongs to,
/// returns the stage-typed feedback for it. `session` does not yet contain
/// `submission`.
#[async_trait]
pub trait FeedbackOracle: Send + Sync {
    /// Evaluates one submission.
    async fn submit(&self, session: &SessionState, submission: &StageSubmission) -> OracleResult;
}
