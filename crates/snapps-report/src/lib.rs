//! SNAPPS Report Generation
//!
//! Read-only projections over a [`SessionState`]:
//!
//! - [`TranscriptView`] - every submission and its feedback, grouped by stage
//! - [`SummaryView`] - the aggregate [`PerformanceReport`] of a completed session
//! - [`SessionReport`] - both, bundled for rendering
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - compact or pretty JSON
//! - [`MarkdownGenerator`] - human-readable Markdown
//!
//! Projections are pure: rendering twice from an unchanged session produces
//! identical output.
//!
//! # Example
//!
//! ```rust
//! use snapps_report::{MarkdownGenerator, SessionReport};
//! use snapps_workflow::{CaseContext, SessionState, WorkflowKind};
//!
//! let session = SessionState::new(
//!     WorkflowKind::Snapps.catalog(),
//!     CaseContext::new("cp-01", "chest pain"),
//! );
//! let report = SessionReport::from_session(&session);
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# SNAPPS Session Report"));
//! ```

pub mod json;
mod markdown;
pub mod summary;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use markdown::MarkdownGenerator;
pub use summary::{BucketItem, PerformanceReport, StageGuidance, SummaryView};
pub use transcript::{StageGroup, TranscriptEntry, TranscriptView};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snapps_workflow::{SessionId, SessionState, WorkflowKind};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A summary was requested before every stage was completed.
    #[error("session is not complete: {completed} of {total} stages done")]
    Incomplete {
        /// Stages completed.
        completed: usize,
        /// Stages in the workflow.
        total: usize,
    },
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Progress
// ============================================================================

/// How far through the workflow a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Stages completed in the current pass.
    pub completed_stages: usize,
    /// Stages in the workflow.
    pub total_stages: usize,
    /// `completed_stages / total_stages`, rounded down to a whole percent.
    pub percent: u8,
}

impl Progress {
    /// Computes progress from the session cursor.
    #[must_use]
    pub fn of(session: &SessionState) -> Self {
        let completed_stages = session.active_stage_index();
        let total_stages = session.stage_count();
        let percent = if total_stages == 0 {
            0
        } else {
            u8::try_from(completed_stages * 100 / total_stages).unwrap_or(100)
        };
        Self {
            completed_stages,
            total_stages,
            percent,
        }
    }

    /// Returns `true` if every stage is done.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed_stages == self.total_stages
    }
}

// ============================================================================
// SessionReport
// ============================================================================

/// Everything a rendered report shows, derived from one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session the report describes.
    pub session_id: SessionId,
    /// Workflow that was run.
    pub workflow: WorkflowKind,
    /// Case identifier.
    pub case_id: String,
    /// Case display title.
    pub case_title: String,
    /// Progress through the workflow.
    pub progress: Progress,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
    /// Full transcript.
    pub transcript: TranscriptView,
    /// Aggregate summary, present once the session is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PerformanceReport>,
}

impl SessionReport {
    /// Builds the report for `session`.
    #[must_use]
    pub fn from_session(session: &SessionState) -> Self {
        let case = session.case_context();
        Self {
            session_id: session.id(),
            workflow: session.catalog().workflow(),
            case_id: case.case_id.clone(),
            case_title: case.display_title().to_string(),
            progress: Progress::of(session),
            started_at: session.started_at(),
            updated_at: session.updated_at(),
            transcript: TranscriptView::from_session(session),
            summary: SummaryView::from_session(session).ok(),
        }
    }
}
