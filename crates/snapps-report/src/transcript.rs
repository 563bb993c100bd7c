//! Stage-grouped transcript of a session.
//!
//! Nothing is ever removed from a session's history. After a rewind the
//! earlier answers stay in the transcript and are flagged as superseded: an
//! entry is superseded when a later submission exists for the same stage or
//! any earlier one.

use serde::{Deserialize, Serialize};
use snapps_workflow::{
    FeedbackRecord, SessionId, SessionState, StageId, StageSubmission, WorkflowKind,
};

/// One submission with the feedback it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// What the learner submitted.
    pub submission: StageSubmission,
    /// What the oracle answered, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackRecord>,
    /// Replaced by a later answer after a rewind.
    pub superseded: bool,
}

/// All entries for one stage, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGroup {
    /// Stage.
    pub stage_id: StageId,
    /// Catalog position.
    pub order: usize,
    /// Stage title.
    pub title: String,
    /// Entries in submission order.
    pub entries: Vec<TranscriptEntry>,
}

impl StageGroup {
    /// Returns the entry that currently counts for this stage, if any.
    #[must_use]
    pub fn current(&self) -> Option<&TranscriptEntry> {
        self.entries.iter().rev().find(|e| !e.superseded)
    }
}

/// Ordered, human-readable record of every submission and its feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptView {
    /// Session.
    pub session_id: SessionId,
    /// Workflow.
    pub workflow: WorkflowKind,
    /// Cursor at the time of projection.
    pub active_stage_index: usize,
    /// One group per catalog stage, in catalog order.
    pub groups: Vec<StageGroup>,
}

/// Flags, per submission index, whether a later submission supersedes it.
fn superseded_flags(submissions: &[StageSubmission]) -> Vec<bool> {
    let mut flags = vec![false; submissions.len()];
    let mut lowest_later_order: Option<usize> = None;
    for (index, submission) in submissions.iter().enumerate().rev() {
        flags[index] = lowest_later_order.is_some_and(|lowest| lowest <= submission.order);
        lowest_later_order = Some(
            lowest_later_order.map_or(submission.order, |lowest| lowest.min(submission.order)),
        );
    }
    flags
}

impl TranscriptView {
    /// Projects the transcript of `session`.
    #[must_use]
    pub fn from_session(session: &SessionState) -> Self {
        let submissions = session.submissions();
        let flags = superseded_flags(submissions);

        let groups = session
            .catalog()
            .stages()
            .iter()
            .map(|stage| StageGroup {
                stage_id: stage.id,
                order: stage.order,
                title: stage.title.clone(),
                entries: submissions
                    .iter()
                    .zip(&flags)
                    .filter(|(submission, _)| submission.stage_id == stage.id)
                    .map(|(submission, superseded)| TranscriptEntry {
                        submission: submission.clone(),
                        feedback: session.feedback_for(submission.id).cloned(),
                        superseded: *superseded,
                    })
                    .collect(),
            })
            .collect();

        Self {
            session_id: session.id(),
            workflow: session.catalog().workflow(),
            active_stage_index: session.active_stage_index(),
            groups,
        }
    }

    /// Iterates every entry, grouped by stage.
    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.groups.iter().flat_map(|g| g.entries.iter())
    }

    /// Iterates the entries that still count (not superseded).
    pub fn current_entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries().filter(|e| !e.superseded)
    }

    /// Returns the number of superseded entries.
    #[must_use]
    pub fn superseded_count(&self) -> usize {
        self.entries().filter(|e| e.superseded).count()
    }

    /// Returns the group for a stage.
    #[must_use]
    pub fn group(&self, stage: StageId) -> Option<&StageGroup> {
        self.groups.iter().find(|g| g.stage_id == stage)
    }

    /// Returns `true` if nothing has been submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.entries.is_empty())
    }
}
