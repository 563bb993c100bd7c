//! Oracle request bodies.
//!
//! The payload shape depends only on the stage's [`StageKind`]. Each payload
//! carries the case text plus whatever earlier answers the oracle needs to
//! reason with continuity.

use serde::Serialize;

use crate::catalog::{StageId, StageInput, StageKind, WorkflowKind};
use crate::session::{SessionId, SessionState, StageSubmission};

/// An earlier stage's answer, forwarded for continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorResponse {
    /// Stage that was answered.
    pub stage: StageId,
    /// What the learner entered.
    pub response: StageInput,
}

/// Stage-specific request fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StagePayload {
    /// Case text and the learner's summary.
    Summary {
        /// Rendered case.
        case_text: String,
        /// Learner summary.
        summary: String,
    },
    /// Prior summary and the learner's diagnoses.
    Differential {
        /// Rendered case.
        case_text: String,
        /// Most recent summary, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        /// Learner diagnoses.
        differential: Vec<String>,
    },
    /// Differential plus the learner's compare-and-contrast.
    Analysis {
        /// Rendered case.
        case_text: String,
        /// Most recent summary, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        /// Most recent differential.
        differential: Vec<String>,
        /// Learner analysis.
        analysis: String,
    },
    /// Accumulated context plus the learner's questions.
    Probe {
        /// Rendered case.
        case_text: String,
        /// Most recent summary, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        /// Most recent differential.
        differential: Vec<String>,
        /// Most recent analysis, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        analysis: Option<String>,
        /// Learner questions.
        questions: Vec<String>,
    },
    /// Differential plus the learner's management plan.
    Plan {
        /// Rendered case.
        case_text: String,
        /// Most recent differential.
        differential: Vec<String>,
        /// Learner plan.
        plan: String,
    },
    /// Differential plus the chosen learning issue.
    Selection {
        /// Rendered case.
        case_text: String,
        /// Most recent differential.
        differential: Vec<String>,
        /// Learner's chosen issue.
        learning_issue: String,
    },
    /// Generic reflective stage with every earlier answer.
    Reflection {
        /// Rendered case.
        case_text: String,
        /// Learner response.
        response: StageInput,
        /// Earlier answers in catalog order.
        prior_responses: Vec<PriorResponse>,
    },
}

/// Full body of `POST {base_url}/{workflow}/{stage}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleRequest {
    /// Session the submission belongs to.
    pub session_id: SessionId,
    /// Workflow wire name.
    pub workflow: WorkflowKind,
    /// Stage wire name.
    pub stage: StageId,
    /// Stage-specific fields, inlined.
    #[serde(flatten)]
    pub payload: StagePayload,
}

impl OracleRequest {
    /// Builds the request for `submission` against `session`.
    #[must_use]
    pub fn build(session: &SessionState, submission: &StageSubmission) -> Self {
        Self {
            session_id: session.id(),
            workflow: session.catalog().workflow(),
            stage: submission.stage_id,
            payload: build_payload(session, submission),
        }
    }

    /// Returns the endpoint path relative to the oracle base URL.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.workflow.as_str(), self.stage.as_str())
    }
}

fn prior_text(session: &SessionState, stage: StageId) -> Option<String> {
    session
        .latest_input(stage)
        .map(StageInput::as_text)
        .filter(|text| !text.is_empty())
}

fn prior_differential(session: &SessionState) -> Vec<String> {
    session
        .latest_input(StageId::Narrow)
        .map(StageInput::filled_entries)
        .unwrap_or_default()
}

fn build_payload(session: &SessionState, submission: &StageSubmission) -> StagePayload {
    let case_text = session.case_context().to_case_text();
    let input = &submission.raw_input;

    match submission.stage_id.kind() {
        StageKind::Summary => StagePayload::Summary {
            case_text,
            summary: input.as_text(),
        },
        StageKind::Differential => StagePayload::Differential {
            case_text,
            summary: prior_text(session, StageId::Summarize),
            differential: input.filled_entries(),
        },
        StageKind::Analysis => StagePayload::Analysis {
            case_text,
            summary: prior_text(session, StageId::Summarize),
            differential: prior_differential(session),
            analysis: input.as_text(),
        },
        StageKind::Probe => StagePayload::Probe {
            case_text,
            summary: prior_text(session, StageId::Summarize),
            differential: prior_differential(session),
            analysis: prior_text(session, StageId::Analyze),
            questions: input.filled_entries(),
        },
        StageKind::Plan => StagePayload::Plan {
            case_text,
            differential: prior_differential(session),
            plan: input.as_text(),
        },
        StageKind::Selection => StagePayload::Selection {
            case_text,
            differential: prior_differential(session),
            learning_issue: input.as_text(),
        },
        StageKind::Reflection => StagePayload::Reflection {
            case_text,
            response: input.clone(),
            prior_responses: session
                .catalog()
                .stages()
                .iter()
                .take(submission.order)
                .filter_map(|stage| {
                    session.latest_input(stage.id).map(|response| PriorResponse {
                        stage: stage.id,
                        response: response.clone(),
                    })
                })
                .collect(),
        },
    }
}
