//! Session state for a guided case workflow.
//!
//! [`SessionState`] is the single source of truth for a learner's progress:
//! the case, the active-stage cursor, and the append-only submission and
//! feedback histories. It is owned and mutated by the orchestrator; views
//! only read it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::case::CaseContext;
use crate::catalog::{StageCatalog, StageDefinition, StageId, StageInput};
use crate::error::{Result, WorkflowError};
use crate::feedback::FeedbackRecord;

// ============================================================================
// Identifiers
// ============================================================================

/// Identity of one session. A reset always produces a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential id of a submission within its session.
///
/// Equal to the submission's index in the history, so id order is
/// chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// StageSubmission
// ============================================================================

/// One learner interaction. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSubmission {
    /// Sequential id within the session.
    pub id: SubmissionId,
    /// Stage submitted.
    pub stage_id: StageId,
    /// Catalog position of the stage.
    pub order: usize,
    /// What the learner entered.
    pub raw_input: StageInput,
    /// When the learner submitted.
    pub timestamp: DateTime<Utc>,
    /// Pass the submission belongs to (bumped by every rewind).
    pub pass: u32,
}

// ============================================================================
// SessionState
// ============================================================================

/// Mutable record of one learner's pass through a workflow.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: SessionId,
    catalog: StageCatalog,
    case_context: CaseContext,
    active_stage_index: usize,
    pass: u32,
    submissions: Vec<StageSubmission>,
    feedback: Vec<FeedbackRecord>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a fresh session at stage 0.
    #[must_use]
    pub fn new(catalog: StageCatalog, case_context: CaseContext) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            catalog,
            case_context,
            active_stage_index: 0,
            pass: 0,
            submissions: Vec::new(),
            feedback: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Replaces all state with a fresh session for `case_context`.
    ///
    /// This is a reset, not a merge: history, cursor and id are all replaced.
    pub fn initialize(&mut self, case_context: CaseContext) {
        *self = Self::new(self.catalog.clone(), case_context);
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the stage catalog.
    #[must_use]
    pub const fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Returns the case under discussion.
    #[must_use]
    pub const fn case_context(&self) -> &CaseContext {
        &self.case_context
    }

    /// Returns the 0-based cursor into the catalog.
    #[must_use]
    pub const fn active_stage_index(&self) -> usize {
        self.active_stage_index
    }

    /// Returns the number of stages in the catalog.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.catalog.len()
    }

    /// Returns the current pass number.
    #[must_use]
    pub const fn pass(&self) -> u32 {
        self.pass
    }

    /// Returns the submission history in submission order.
    #[must_use]
    pub fn submissions(&self) -> &[StageSubmission] {
        &self.submissions
    }

    /// Returns the feedback history in arrival order.
    #[must_use]
    pub fn feedback(&self) -> &[FeedbackRecord] {
        &self.feedback
    }

    /// Returns when the session started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the session last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the time between session start and the last change.
    #[must_use]
    pub fn active_duration(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Returns `true` once every stage has been passed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.active_stage_index == self.catalog.len()
    }

    /// Returns the stage under the cursor, or `None` once complete.
    #[must_use]
    pub fn current_stage(&self) -> Option<&StageDefinition> {
        self.catalog.stage_at(self.active_stage_index).ok()
    }

    /// Returns the next submission id.
    #[must_use]
    pub fn next_submission_id(&self) -> SubmissionId {
        SubmissionId(self.submissions.len() as u64)
    }

    fn require_current_stage(&self, action: &str) -> Result<&StageDefinition> {
        self.current_stage()
            .ok_or_else(|| WorkflowError::invalid_transition("Completed", action))
    }

    /// Checks `input` against the current stage's requirement.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Validation` if the requirement fails and
    /// `WorkflowError::InvalidTransition` if the session is complete.
    pub fn validate_input(&self, input: &StageInput) -> Result<()> {
        let stage = self.require_current_stage("validate")?;
        stage.input_required.check(stage.id, input)
    }

    /// Builds the submission the current input would become, without recording it.
    ///
    /// # Errors
    ///
    /// Same as [`SessionState::validate_input`].
    pub fn draft_submission(&self, input: StageInput) -> Result<StageSubmission> {
        self.validate_input(&input)?;
        let stage = self.require_current_stage("submit")?;
        Ok(StageSubmission {
            id: self.next_submission_id(),
            stage_id: stage.id,
            order: stage.order,
            raw_input: input,
            timestamp: Utc::now(),
            pass: self.pass,
        })
    }

    /// Appends a submission for the current stage.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Validation` if the input requirement fails.
    /// Returns `WorkflowError::InvalidTransition` if the submission was drafted
    /// for another stage, pass or history position, or the session is complete.
    pub fn record_submission(&mut self, submission: StageSubmission) -> Result<SubmissionId> {
        let stage = self.require_current_stage("record submission")?;
        if submission.stage_id != stage.id || submission.order != stage.order {
            return Err(WorkflowError::invalid_transition(
                format!("AwaitingInput({})", stage.id),
                format!("record submission for {}", submission.stage_id),
            ));
        }
        stage
            .input_required
            .check(stage.id, &submission.raw_input)?;
        if submission.id != self.next_submission_id() || submission.pass != self.pass {
            return Err(WorkflowError::invalid_transition(
                format!("history at {} (pass {})", self.next_submission_id(), self.pass),
                format!("record stale submission {} (pass {})", submission.id, submission.pass),
            ));
        }

        let id = submission.id;
        self.submissions.push(submission);
        self.touch();
        Ok(id)
    }

    /// Appends a feedback record.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` unless the referenced
    /// submission exists for the same stage in the current pass and that stage
    /// has no feedback yet in this pass.
    pub fn record_feedback(&mut self, record: FeedbackRecord) -> Result<()> {
        let Some(submission) = self.submission(record.for_submission) else {
            return Err(WorkflowError::invalid_transition(
                "history",
                format!("record feedback for unknown submission {}", record.for_submission),
            ));
        };
        if submission.stage_id != record.stage_id || submission.pass != self.pass {
            return Err(WorkflowError::invalid_transition(
                format!("{} pass {}", submission.stage_id, submission.pass),
                format!("record feedback for {} in pass {}", record.stage_id, self.pass),
            ));
        }
        if self.has_feedback_in_pass(record.stage_id, self.pass) {
            return Err(WorkflowError::invalid_transition(
                format!("{} already has feedback in pass {}", record.stage_id, self.pass),
                "record duplicate feedback",
            ));
        }

        self.feedback.push(record);
        self.touch();
        Ok(())
    }

    /// Moves the cursor forward by one stage.
    ///
    /// Returns `false` (and does nothing) if the session is already complete.
    pub fn advance(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.active_stage_index += 1;
        self.touch();
        true
    }

    /// Moves the cursor back to an earlier stage, starting a new pass.
    ///
    /// History is never deleted.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` unless `to_index` is strictly
    /// below the cursor.
    pub fn rewind(&mut self, to_index: usize) -> Result<()> {
        if to_index >= self.active_stage_index {
            return Err(WorkflowError::invalid_transition(
                format!("stage index {}", self.active_stage_index),
                format!("rewind to stage index {to_index}"),
            ));
        }
        self.active_stage_index = to_index;
        self.pass += 1;
        self.touch();
        Ok(())
    }

    /// Looks up a submission by id.
    #[must_use]
    pub fn submission(&self, id: SubmissionId) -> Option<&StageSubmission> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.submissions.get(index))
    }

    /// Returns the feedback for a submission, if any arrived.
    #[must_use]
    pub fn feedback_for(&self, id: SubmissionId) -> Option<&FeedbackRecord> {
        self.feedback.iter().find(|f| f.for_submission == id)
    }

    /// Returns the most recent submission for a stage.
    #[must_use]
    pub fn latest_submission(&self, stage: StageId) -> Option<&StageSubmission> {
        self.submissions.iter().rev().find(|s| s.stage_id == stage)
    }

    /// Returns the most recent input submitted for a stage.
    #[must_use]
    pub fn latest_input(&self, stage: StageId) -> Option<&StageInput> {
        self.latest_submission(stage).map(|s| &s.raw_input)
    }

    /// Returns `true` if `stage` already has feedback in `pass`.
    #[must_use]
    pub fn has_feedback_in_pass(&self, stage: StageId, pass: u32) -> bool {
        self.feedback.iter().any(|f| {
            f.stage_id == stage
                && self
                    .submission(f.for_submission)
                    .is_some_and(|s| s.pass == pass)
        })
    }

    /// Updates the `updated_at` timestamp to the current time.
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
