//! The workflow state machine.
//!
//! [`WorkflowOrchestrator`] owns the session and moves it through
//! `Idle -> AwaitingInput(i) -> Submitting(i) -> ... -> Completed`. Every
//! change goes through [`WorkflowOrchestrator::dispatch`]; the oracle round
//! trip itself happens outside the state machine, between a `Submit` that
//! hands out a [`PendingSubmission`] and the `Resolve` that feeds the result
//! back in. [`WorkflowOrchestrator::submit`] drives both halves with a bounded
//! wait.
//!
//! Responses are matched to the in-flight submission by [`SubmissionTicket`].
//! A response whose ticket no longer matches (the session was reset,
//! re-initialized, or the ticket was already resolved) is discarded.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::case::CaseContext;
use crate::catalog::{StageCatalog, StageDefinition, StageInput};
use crate::config::Config;
use crate::error::{Result, WorkflowError};
use crate::events::{EventBroadcaster, WorkflowEvent};
use crate::feedback::FeedbackRecord;
use crate::oracle::{FeedbackOracle, OracleError, OracleResult};
use crate::session::{SessionId, SessionState, StageSubmission, SubmissionId};

/// Default bound on one oracle round trip.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// State
// ============================================================================

/// Category of a learner-visible stage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// Input did not satisfy the stage requirement.
    Validation,
    /// Credential missing or rejected; the learner must sign in again.
    Authentication,
    /// Oracle unreachable or returned an error status.
    Unavailable,
    /// Oracle answered with an unexpected shape.
    Contract,
    /// Anything else.
    Internal,
}

/// Dismissible error attached to `AwaitingInput` after a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    /// Category.
    pub kind: StageErrorKind,
    /// Message with its suggestion line.
    pub message: String,
}

impl StageError {
    /// Captures a learner-facing snapshot of `err`.
    #[must_use]
    pub fn from_error(err: &WorkflowError) -> Self {
        let kind = match err {
            WorkflowError::Validation { .. } => StageErrorKind::Validation,
            WorkflowError::Authentication { .. } => StageErrorKind::Authentication,
            WorkflowError::OracleUnavailable { .. } => StageErrorKind::Unavailable,
            WorkflowError::OracleContract { .. } => StageErrorKind::Contract,
            _ => StageErrorKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }

    /// Returns `true` if resubmitting the same input may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, StageErrorKind::Unavailable)
    }

    /// Returns `true` if the learner should be prompted to sign in again.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self.kind, StageErrorKind::Authentication)
    }
}

/// Identifies one in-flight submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionTicket {
    /// Orchestrator generation; bumped by every reset and initialize.
    pub generation: u64,
    /// Session the submission belongs to.
    pub session_id: SessionId,
    /// Stage being submitted.
    pub stage_index: usize,
    /// Id the submission will be recorded under.
    pub submission_id: SubmissionId,
}

/// Current state of the orchestrator.
///
/// Each variant carries only what is valid in that state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkflowState {
    /// No session.
    #[default]
    Idle,
    /// Waiting for the learner at `stage_index`.
    AwaitingInput {
        /// Active stage.
        stage_index: usize,
        /// Input the learner has typed so far, kept across failures.
        draft: Option<StageInput>,
        /// Error from the last failed submission, until dismissed.
        error: Option<StageError>,
    },
    /// A submission is at the oracle.
    Submitting {
        /// Ticket the response must carry.
        ticket: SubmissionTicket,
        /// The submission awaiting feedback.
        submission: StageSubmission,
    },
    /// Every stage has been accepted.
    Completed,
}

impl WorkflowState {
    /// Returns the active stage index, if the state has one.
    #[must_use]
    pub const fn stage_index(&self) -> Option<usize> {
        match self {
            Self::AwaitingInput { stage_index, .. } => Some(*stage_index),
            Self::Submitting { ticket, .. } => Some(ticket.stage_index),
            Self::Idle | Self::Completed => None,
        }
    }

    /// Returns `true` while a submission is in flight.
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingInput { stage_index, .. } => write!(f, "AwaitingInput({stage_index})"),
            Self::Submitting { ticket, .. } => write!(f, "Submitting({})", ticket.stage_index),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

// ============================================================================
// Actions and outcomes
// ============================================================================

/// Input to the transition function.
#[derive(Debug)]
pub enum Action {
    /// Start a fresh session for a case, abandoning any current one.
    Initialize(CaseContext),
    /// Update the draft for the active stage.
    EditDraft(StageInput),
    /// Submit input for the active stage.
    Submit(StageInput),
    /// Feed back the result of an oracle round trip.
    Resolve {
        /// Ticket from the pending submission.
        ticket: SubmissionTicket,
        /// What the oracle returned.
        result: OracleResult,
    },
    /// Move the cursor to a stage index (only backwards).
    Navigate(usize),
    /// Clear the error, keeping the draft.
    DismissError,
    /// Abandon the session and go idle.
    Reset,
}

/// Everything the caller needs to perform one oracle round trip.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    /// Ticket to pass back with `Action::Resolve`.
    pub ticket: SubmissionTicket,
    /// The drafted submission.
    pub submission: StageSubmission,
    /// Owned session snapshot taken before the submission is recorded.
    pub snapshot: SessionState,
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub enum Outcome {
    /// Awaiting input at `stage_index`.
    Ready {
        /// Active stage.
        stage_index: usize,
    },
    /// The caller must perform this oracle round trip and then `Resolve`.
    CallOracle(Box<PendingSubmission>),
    /// Feedback recorded; the cursor moved forward.
    Advanced {
        /// New active stage.
        stage_index: usize,
    },
    /// The cursor moved back to an earlier stage.
    Rewound {
        /// New active stage.
        stage_index: usize,
    },
    /// The last stage was accepted.
    Completed,
    /// A stale oracle response was ignored.
    Discarded,
    /// Nothing changed.
    Unchanged,
    /// The session was abandoned.
    Reset,
}

fn apply_feedback(
    session: &mut SessionState,
    submission: StageSubmission,
    record: FeedbackRecord,
) -> Result<()> {
    session.record_submission(submission)?;
    session.record_feedback(record)?;
    session.advance();
    Ok(())
}

// ============================================================================
// WorkflowOrchestrator
// ============================================================================

/// Drives one learner through one workflow.
pub struct WorkflowOrchestrator {
    catalog: StageCatalog,
    oracle: Arc<dyn FeedbackOracle>,
    session: Option<SessionState>,
    state: WorkflowState,
    generation: u64,
    timeout: Duration,
    events: EventBroadcaster,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("workflow", &self.catalog.workflow())
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new(catalog: StageCatalog, oracle: Arc<dyn FeedbackOracle>) -> Self {
        Self {
            catalog,
            oracle,
            session: None,
            state: WorkflowState::Idle,
            generation: 0,
            timeout: DEFAULT_ORACLE_TIMEOUT,
            events: EventBroadcaster::default(),
        }
    }

    /// Creates an idle orchestrator for the configured workflow and timeout.
    #[must_use]
    pub fn from_config(config: &Config, oracle: Arc<dyn FeedbackOracle>) -> Self {
        Self::new(config.workflow.catalog(), oracle).with_timeout(config.oracle.timeout())
    }

    /// Sets the bound on one oracle round trip.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publishes events on `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Returns the session, if one is active.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Returns the stage catalog.
    #[must_use]
    pub const fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the bound on one oracle round trip.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the stage awaiting input or being submitted.
    #[must_use]
    pub fn current_stage(&self) -> Option<&StageDefinition> {
        self.state
            .stage_index()
            .and_then(|index| self.catalog.stage_at(index).ok())
    }

    /// Returns the retained draft (or the in-flight input while submitting).
    #[must_use]
    pub const fn draft(&self) -> Option<&StageInput> {
        match &self.state {
            WorkflowState::AwaitingInput { draft, .. } => draft.as_ref(),
            WorkflowState::Submitting { submission, .. } => Some(&submission.raw_input),
            WorkflowState::Idle | WorkflowState::Completed => None,
        }
    }

    /// Returns the error from the last failed submission, if not dismissed.
    #[must_use]
    pub const fn error(&self) -> Option<&StageError> {
        match &self.state {
            WorkflowState::AwaitingInput { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` once the session has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, WorkflowState::Completed)
    }

    /// Subscribes to workflow events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Applies one action.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` if the action is not allowed
    /// in the current state. A failed submission (validation or oracle error)
    /// returns the typed error after moving back to `AwaitingInput` with the
    /// draft and a [`StageError`] retained.
    pub fn dispatch(&mut self, action: Action) -> Result<Outcome> {
        match action {
            Action::Initialize(case) => Ok(self.initialize(case)),
            Action::EditDraft(input) => self.edit_draft(input),
            Action::Submit(input) => self.begin_submit(input),
            Action::Resolve { ticket, result } => self.resolve(ticket, result),
            Action::Navigate(index) => self.navigate(index),
            Action::DismissError => self.dismiss_error(),
            Action::Reset => Ok(self.reset()),
        }
    }

    /// Submits input for the active stage and waits for the oracle.
    ///
    /// The wait is bounded by the configured timeout; past it the submission
    /// fails as unavailable and the draft is kept.
    ///
    /// # Errors
    ///
    /// Same as [`WorkflowOrchestrator::dispatch`] with `Action::Submit`, plus
    /// the oracle failure mapped into `WorkflowError`.
    pub async fn submit(&mut self, input: StageInput) -> Result<Outcome> {
        let pending = match self.dispatch(Action::Submit(input))? {
            Outcome::CallOracle(pending) => pending,
            other => return Ok(other),
        };

        let oracle = Arc::clone(&self.oracle);
        let stage = pending.submission.stage_id;
        let result = match tokio::time::timeout(
            self.timeout,
            oracle.submit(&pending.snapshot, &pending.submission),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(OracleError::unavailable(
                stage,
                None,
                format!("no response within {}s", self.timeout.as_secs()),
            )),
        };

        self.dispatch(Action::Resolve {
            ticket: pending.ticket,
            result,
        })
    }

    fn reject(&self, action: impl std::fmt::Display) -> WorkflowError {
        warn!(state = %self.state, action = %action, "Rejected invalid transition");
        WorkflowError::invalid_transition(&self.state, action)
    }

    fn initialize(&mut self, case: CaseContext) -> Outcome {
        self.generation += 1;
        match self.session.as_mut() {
            Some(session) => session.initialize(case),
            None => self.session = Some(SessionState::new(self.catalog.clone(), case)),
        }
        self.state = WorkflowState::AwaitingInput {
            stage_index: 0,
            draft: None,
            error: None,
        };

        if let Some(session) = &self.session {
            info!(
                session_id = %session.id(),
                workflow = %self.catalog.workflow(),
                case_id = %session.case_context().case_id,
                generation = self.generation,
                "Session started"
            );
            self.events.send(WorkflowEvent::SessionStarted {
                session_id: session.id(),
                workflow: self.catalog.workflow(),
                case_id: session.case_context().case_id.clone(),
                stage_count: session.stage_count(),
                started_at: session.started_at(),
            });
        }
        Outcome::Ready { stage_index: 0 }
    }

    fn edit_draft(&mut self, input: StageInput) -> Result<Outcome> {
        if let WorkflowState::AwaitingInput {
            stage_index, draft, ..
        } = &mut self.state
        {
            debug!(stage_index = *stage_index, "Draft updated");
            *draft = Some(input);
            return Ok(Outcome::Ready {
                stage_index: *stage_index,
            });
        }
        Err(self.reject("edit draft"))
    }

    fn begin_submit(&mut self, input: StageInput) -> Result<Outcome> {
        let WorkflowState::AwaitingInput { stage_index, .. } = self.state else {
            return Err(self.reject("submit"));
        };
        let Some(session) = self.session.as_ref() else {
            return Err(self.reject("submit"));
        };

        let drafted = session
            .draft_submission(input.clone())
            .map(|submission| (submission, session.clone()));
        let (submission, snapshot) = match drafted {
            Ok(drafted) => drafted,
            Err(err) => return Err(self.fail(stage_index, input, err)),
        };

        let ticket = SubmissionTicket {
            generation: self.generation,
            session_id: snapshot.id(),
            stage_index,
            submission_id: submission.id,
        };
        info!(
            stage = %submission.stage_id,
            stage_index,
            generation = self.generation,
            session_id = %ticket.session_id,
            "Submitting stage"
        );
        self.events.send(WorkflowEvent::SubmissionStarted {
            session_id: ticket.session_id,
            stage: submission.stage_id,
            submission: submission.id,
        });
        self.state = WorkflowState::Submitting {
            ticket,
            submission: submission.clone(),
        };

        Ok(Outcome::CallOracle(Box::new(PendingSubmission {
            ticket,
            submission,
            snapshot,
        })))
    }

    /// Returns to `AwaitingInput(stage_index)` keeping `draft`, and hands back `err`.
    fn fail(&mut self, stage_index: usize, draft: StageInput, err: WorkflowError) -> WorkflowError {
        let stage_error = StageError::from_error(&err);
        let stage = self.catalog.stage_at(stage_index).ok().map(|s| s.id);

        match &err {
            WorkflowError::Validation { .. } => {
                debug!(stage_index, error = %err, "Submission failed validation");
            }
            WorkflowError::Authentication { .. } | WorkflowError::OracleUnavailable { .. } => {
                warn!(stage_index, error = %err, "Oracle round trip failed");
            }
            _ => {
                tracing::error!(stage_index, error = %err, "Submission failed");
            }
        }

        if let (Some(session), Some(stage)) = (&self.session, stage) {
            self.events.send(WorkflowEvent::SubmissionFailed {
                session_id: session.id(),
                stage,
                message: stage_error.message.clone(),
                retryable: err.is_retryable(),
            });
        }

        self.state = WorkflowState::AwaitingInput {
            stage_index,
            draft: Some(draft),
            error: Some(stage_error),
        };
        err
    }

    fn resolve(&mut self, ticket: SubmissionTicket, result: OracleResult) -> Result<Outcome> {
        let submission = match &self.state {
            WorkflowState::Submitting {
                ticket: in_flight,
                submission,
            } if *in_flight == ticket => submission.clone(),
            _ => {
                debug!(
                    generation = ticket.generation,
                    current_generation = self.generation,
                    stage_index = ticket.stage_index,
                    "Discarding stale oracle response"
                );
                return Ok(Outcome::Discarded);
            }
        };
        let stage_index = ticket.stage_index;
        let draft = submission.raw_input.clone();

        let record = match result {
            Ok(record) => record,
            Err(err) => return Err(self.fail(stage_index, draft, err.into())),
        };
        if record.stage_id != submission.stage_id || record.for_submission != submission.id {
            let err = WorkflowError::oracle_contract(
                submission.stage_id,
                format!(
                    "feedback is for {} {}, expected {} {}",
                    record.stage_id, record.for_submission, submission.stage_id, submission.id
                ),
            );
            return Err(self.fail(stage_index, draft, err));
        }

        let Some(current) = self.session.as_ref() else {
            return Ok(Outcome::Discarded);
        };
        // Applied to a copy and swapped in, so no caller sees a half-applied stage.
        let mut next = current.clone();
        if let Err(err) = apply_feedback(&mut next, submission.clone(), record) {
            return Err(self.fail(stage_index, draft, err));
        }

        let session_id = next.id();
        let complete = next.is_complete();
        let submissions = next.submissions().len();
        self.session = Some(next);

        self.events.send(WorkflowEvent::FeedbackReceived {
            session_id,
            stage: submission.stage_id,
            submission: submission.id,
        });
        self.events.send(WorkflowEvent::StageChanged {
            session_id,
            from_index: stage_index,
            to_index: stage_index + 1,
            rewind: false,
        });

        if complete {
            self.state = WorkflowState::Completed;
            info!(session_id = %session_id, submissions, "Session completed");
            self.events.send(WorkflowEvent::SessionCompleted {
                session_id,
                submissions,
                completed_at: chrono::Utc::now(),
            });
            return Ok(Outcome::Completed);
        }

        self.state = WorkflowState::AwaitingInput {
            stage_index: stage_index + 1,
            draft: None,
            error: None,
        };
        info!(
            stage = %submission.stage_id,
            stage_index = stage_index + 1,
            "Stage accepted, advancing"
        );
        Ok(Outcome::Advanced {
            stage_index: stage_index + 1,
        })
    }

    fn navigate(&mut self, to_index: usize) -> Result<Outcome> {
        let WorkflowState::AwaitingInput { stage_index, .. } = self.state else {
            return Err(self.reject(format!("navigate to stage index {to_index}")));
        };
        if to_index == stage_index {
            return Ok(Outcome::Unchanged);
        }
        if to_index > stage_index {
            return Err(self.reject(format!("navigate forward to stage index {to_index}")));
        }

        let Some(session) = self.session.as_mut() else {
            return Err(self.reject("navigate"));
        };
        session.rewind(to_index)?;
        let draft = session
            .catalog()
            .stage_at(to_index)
            .ok()
            .and_then(|stage| session.latest_input(stage.id).cloned());
        let session_id = session.id();
        let pass = session.pass();

        self.state = WorkflowState::AwaitingInput {
            stage_index: to_index,
            draft,
            error: None,
        };
        info!(
            session_id = %session_id,
            from_index = stage_index,
            to_index,
            pass,
            "Rewound to earlier stage"
        );
        self.events.send(WorkflowEvent::StageChanged {
            session_id,
            from_index: stage_index,
            to_index,
            rewind: true,
        });
        Ok(Outcome::Rewound {
            stage_index: to_index,
        })
    }

    fn dismiss_error(&mut self) -> Result<Outcome> {
        if let WorkflowState::AwaitingInput {
            stage_index, error, ..
        } = &mut self.state
        {
            *error = None;
            return Ok(Outcome::Ready {
                stage_index: *stage_index,
            });
        }
        Err(self.reject("dismiss error"))
    }

    fn reset(&mut self) -> Outcome {
        let previous = self.session.take().map(|s| s.id());
        self.generation += 1;
        if self.state.is_submitting() {
            debug!(generation = self.generation, "Reset while submitting; response will be discarded");
        }
        self.state = WorkflowState::Idle;
        info!(generation = self.generation, "Session reset");
        self.events.send(WorkflowEvent::SessionReset { previous });
        Outcome::Reset
    }
}
