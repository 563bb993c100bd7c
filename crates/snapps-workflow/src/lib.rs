//! SNAPPS workflow engine
//!
//! Drives a learner through an ordered sequence of clinical reasoning stages,
//! exchanges each stage with an external feedback oracle, and keeps the
//! session history the report views are derived from.

pub mod case;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod feedback;
pub mod oracle;
pub mod orchestrator;
pub mod session;

pub use case::{CaseContext, Patient, MAX_CASE_SIZE};
pub use catalog::{
    InputRequirement, StageCatalog, StageDefinition, StageId, StageInput, StageKind, WorkflowKind,
};
pub use config::{Config, OracleConfig, CONFIG_FILE_NAME};
pub use error::{Result, WorkflowError};
pub use events::{EventBroadcaster, WorkflowEvent};
pub use feedback::{EvaluatedDiagnosis, FeedbackDetail, FeedbackRecord, Plausibility, ProbeAnswer};
pub use oracle::{
    EnvToken, FeedbackOracle, HttpOracleGateway, OracleError, OracleResult, StaticToken,
    TokenProvider,
};
pub use orchestrator::{
    Action, Outcome, PendingSubmission, StageError, StageErrorKind, SubmissionTicket,
    WorkflowOrchestrator, WorkflowState, DEFAULT_ORACLE_TIMEOUT,
};
pub use session::{SessionId, SessionState, StageSubmission, SubmissionId};
