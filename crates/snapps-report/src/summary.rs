//! End-of-session performance summary.
//!
//! [`SummaryView`] folds the feedback of a completed session into the three
//! canonical buckets (strengths, gaps, follow-ups). Only entries that still
//! count are aggregated; superseded entries are counted but not merged.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snapps_workflow::{EvaluatedDiagnosis, SessionState, StageId, WorkflowKind};

use crate::transcript::TranscriptView;
use crate::{Progress, ReportError, Result};

/// One bucket line, tagged with the stage it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketItem {
    /// Originating stage.
    pub stage: StageId,
    /// Feedback text.
    pub text: String,
}

/// Free-text guidance for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGuidance {
    /// Stage.
    pub stage: StageId,
    /// Stage title.
    pub title: String,
    /// Guidance text.
    pub guidance: String,
}

/// Aggregated feedback for a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Workflow that was run.
    pub workflow: WorkflowKind,
    /// Completion counts.
    pub progress: Progress,
    /// What the learner did well.
    pub strengths: Vec<BucketItem>,
    /// What was missing.
    pub gaps: Vec<BucketItem>,
    /// Recommended follow-ups.
    pub follow_ups: Vec<BucketItem>,
    /// Guidance per stage, in catalog order.
    pub guidance: Vec<StageGuidance>,
    /// Evaluated differential, if any stage produced one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differential: Vec<EvaluatedDiagnosis>,
    /// Entries replaced after a rewind.
    pub superseded_entries: usize,
    /// Seconds between session start and the last change.
    pub duration_seconds: u64,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the final stage was completed.
    pub completed_at: DateTime<Utc>,
}

impl PerformanceReport {
    /// Returns `true` if every bucket is empty.
    #[must_use]
    pub fn has_no_buckets(&self) -> bool {
        self.strengths.is_empty() && self.gaps.is_empty() && self.follow_ups.is_empty()
    }
}

/// Collects bucket items, dropping case-insensitive duplicates.
#[derive(Default)]
struct Bucket {
    seen: HashSet<String>,
    items: Vec<BucketItem>,
}

impl Bucket {
    fn extend(&mut self, stage: StageId, texts: &[String]) {
        for text in texts {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if self.seen.insert(trimmed.to_lowercase()) {
                self.items.push(BucketItem {
                    stage,
                    text: trimmed.to_string(),
                });
            }
        }
    }
}

/// Builds a [`PerformanceReport`] from a session.
pub struct SummaryView<'a> {
    session: &'a SessionState,
}

impl<'a> SummaryView<'a> {
    /// Creates a summary view over `session`.
    #[must_use]
    pub const fn new(session: &'a SessionState) -> Self {
        Self { session }
    }

    /// Shorthand for `SummaryView::new(session).build()`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Incomplete`] if the session is not complete.
    pub fn from_session(session: &'a SessionState) -> Result<PerformanceReport> {
        Self::new(session).build()
    }

    /// Aggregates the session's feedback.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Incomplete`] if the session is not complete.
    pub fn build(&self) -> Result<PerformanceReport> {
        let progress = Progress::of(self.session);
        if !self.session.is_complete() {
            return Err(ReportError::Incomplete {
                completed: progress.completed_stages,
                total: progress.total_stages,
            });
        }

        let transcript = TranscriptView::from_session(self.session);

        let mut strengths = Bucket::default();
        let mut gaps = Bucket::default();
        let mut follow_ups = Bucket::default();
        let mut guidance = Vec::new();
        let mut differential: Vec<EvaluatedDiagnosis> = Vec::new();

        for group in &transcript.groups {
            for entry in group.entries.iter().filter(|e| !e.superseded) {
                let Some(feedback) = &entry.feedback else {
                    continue;
                };
                strengths.extend(group.stage_id, &feedback.strengths);
                gaps.extend(group.stage_id, &feedback.gaps);
                follow_ups.extend(group.stage_id, &feedback.follow_ups);

                if !feedback.guidance.trim().is_empty() {
                    guidance.push(StageGuidance {
                        stage: group.stage_id,
                        title: group.title.clone(),
                        guidance: feedback.guidance.trim().to_string(),
                    });
                }

                for evaluated in feedback.evaluated_differential() {
                    let duplicate = differential
                        .iter()
                        .any(|d| d.diagnosis.eq_ignore_ascii_case(&evaluated.diagnosis));
                    if !duplicate {
                        differential.push(evaluated.clone());
                    }
                }
            }
        }

        let duration_seconds =
            u64::try_from(self.session.active_duration().num_seconds()).unwrap_or(0);

        Ok(PerformanceReport {
            workflow: transcript.workflow,
            progress,
            strengths: strengths.items,
            gaps: gaps.items,
            follow_ups: follow_ups.items,
            guidance,
            differential,
            superseded_entries: transcript.superseded_count(),
            duration_seconds,
            started_at: self.session.started_at(),
            completed_at: self.session.updated_at(),
        })
    }
}
