//! Workflow events for views that re-render on change.
//!
//! The orchestrator publishes a [`WorkflowEvent`] after every state change.
//! Views subscribe through an [`EventBroadcaster`] and re-derive what they
//! show from the session; events carry only enough to decide what changed.
//!
//! # Example
//!
//! ```no_run
//! use snapps_workflow::events::{EventBroadcaster, WorkflowEvent};
//! use snapps_workflow::SessionId;
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(64);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(WorkflowEvent::SessionReset { previous: Some(SessionId::generate()) });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{}", event.event_name());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::catalog::{StageId, WorkflowKind};
use crate::session::{SessionId, SubmissionId};

// ============================================================================
// Event Enum
// ============================================================================

/// Workflow state change notifications.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A fresh session is awaiting input at stage 0.
    SessionStarted {
        /// New session.
        session_id: SessionId,
        /// Workflow being run.
        workflow: WorkflowKind,
        /// Case under discussion.
        case_id: String,
        /// Number of stages.
        stage_count: usize,
        /// When the session started.
        started_at: DateTime<Utc>,
    },
    /// A submission went out to the oracle.
    SubmissionStarted {
        /// Session.
        session_id: SessionId,
        /// Stage submitted.
        stage: StageId,
        /// Submission id the feedback will carry.
        submission: SubmissionId,
    },
    /// Feedback was recorded.
    FeedbackReceived {
        /// Session.
        session_id: SessionId,
        /// Stage answered.
        stage: StageId,
        /// Submission answered.
        submission: SubmissionId,
    },
    /// A submission was rejected locally or by the oracle; the draft is kept.
    SubmissionFailed {
        /// Session.
        session_id: SessionId,
        /// Stage whose submission failed.
        stage: StageId,
        /// Learner-facing message.
        message: String,
        /// Whether resubmitting may succeed.
        retryable: bool,
    },
    /// The active-stage cursor moved.
    StageChanged {
        /// Session.
        session_id: SessionId,
        /// Previous cursor.
        from_index: usize,
        /// New cursor.
        to_index: usize,
        /// `true` for a rewind.
        rewind: bool,
    },
    /// The last stage was accepted.
    SessionCompleted {
        /// Session.
        session_id: SessionId,
        /// Total submissions across all passes.
        submissions: usize,
        /// When the session completed.
        completed_at: DateTime<Utc>,
    },
    /// The session was abandoned; the orchestrator is idle.
    SessionReset {
        /// Abandoned session, if there was one.
        previous: Option<SessionId>,
    },
}

impl WorkflowEvent {
    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SubmissionStarted { .. } => "submission_started",
            Self::FeedbackReceived { .. } => "feedback_received",
            Self::SubmissionFailed { .. } => "submission_failed",
            Self::StageChanged { .. } => "stage_changed",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionReset { .. } => "session_reset",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts workflow events to every subscribed view.
///
/// Uses a tokio broadcast channel. Events are not kept for late subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with a per-subscriber buffer of `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives `Lagged` and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event; returns how many subscribers will receive it.
    pub fn send(&self, event: WorkflowEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
