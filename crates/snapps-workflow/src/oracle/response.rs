//! Normalization of oracle responses.
//!
//! The oracle answers each stage with its own schema and sometimes wraps the
//! root object in a single-element array. Everything is folded here into one
//! [`FeedbackRecord`] shape; nothing past this module sees the wire format.

use serde::Deserialize;
use serde_json::Value;

use super::OracleError;
use crate::catalog::{StageId, StageKind};
use crate::feedback::{EvaluatedDiagnosis, FeedbackDetail, FeedbackRecord, Plausibility, ProbeAnswer};
use crate::session::SubmissionId;

#[derive(Debug, Deserialize)]
struct WireDiagnosis {
    #[serde(alias = "name")]
    diagnosis: String,
    plausibility: Plausibility,
    #[serde(default, alias = "reasoning")]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAnswer {
    question: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct WireFeedback {
    feedback: String,

    #[serde(default)]
    strengths: Option<Vec<String>>,

    #[serde(default)]
    improvements: Option<Vec<String>>,
    #[serde(default)]
    missing_elements: Option<Vec<String>>,
    #[serde(default)]
    missing_diagnoses: Option<Vec<String>>,
    #[serde(default)]
    gaps: Option<Vec<String>>,

    #[serde(default)]
    follow_up_questions: Option<Vec<String>>,
    #[serde(default)]
    recommended_follow_ups: Option<Vec<String>>,
    #[serde(default)]
    next_steps: Option<Vec<String>>,
    #[serde(default)]
    learning_objectives: Option<Vec<String>>,

    #[serde(default)]
    evaluated_differential: Option<Vec<WireDiagnosis>>,
    #[serde(default)]
    key_discriminators: Option<Vec<String>>,
    #[serde(default)]
    answers: Option<Vec<WireAnswer>>,
    #[serde(default)]
    resources: Option<Vec<String>>,
}

fn fold(lists: impl IntoIterator<Item = Option<Vec<String>>>) -> Vec<String> {
    lists
        .into_iter()
        .flatten()
        .flatten()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Unwraps a single-element array root; rejects anything but an object.
fn unwrap_root(stage: StageId, body: Value) -> Result<Value, OracleError> {
    match body {
        Value::Object(_) => Ok(body),
        Value::Array(mut items) if items.len() == 1 => match items.pop() {
            Some(inner @ Value::Object(_)) => Ok(inner),
            _ => Err(OracleError::contract(
                stage,
                "array-wrapped response does not contain an object",
            )),
        },
        Value::Array(items) => Err(OracleError::contract(
            stage,
            format!("expected a single-element array, got {} elements", items.len()),
        )),
        other => Err(OracleError::contract(
            stage,
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Folds a raw oracle response body into a [`FeedbackRecord`].
///
/// # Errors
///
/// Returns `OracleError::Contract` if the root is not an object (or a
/// single-element array around one), `feedback` is missing, or a field the
/// stage requires is absent or malformed.
pub fn normalize_response(
    stage: StageId,
    for_submission: SubmissionId,
    body: Value,
) -> Result<FeedbackRecord, OracleError> {
    let root = unwrap_root(stage, body)?;
    let wire: WireFeedback =
        serde_json::from_value(root).map_err(|e| OracleError::contract(stage, e.to_string()))?;

    if wire.feedback.trim().is_empty() {
        return Err(OracleError::contract(stage, "feedback must not be empty"));
    }

    let detail = match stage.kind() {
        StageKind::Differential => {
            let evaluated = wire.evaluated_differential.ok_or_else(|| {
                OracleError::contract(stage, "missing field `evaluated_differential`")
            })?;
            FeedbackDetail::Differential {
                evaluated: evaluated
                    .into_iter()
                    .map(|d| EvaluatedDiagnosis {
                        diagnosis: d.diagnosis,
                        plausibility: d.plausibility,
                        rationale: d.rationale.filter(|r| !r.trim().is_empty()),
                    })
                    .collect(),
            }
        }
        StageKind::Probe => {
            let answers = wire
                .answers
                .ok_or_else(|| OracleError::contract(stage, "missing field `answers`"))?;
            FeedbackDetail::Probe {
                answers: answers
                    .into_iter()
                    .map(|a| ProbeAnswer {
                        question: a.question,
                        answer: a.answer,
                    })
                    .collect(),
            }
        }
        StageKind::Analysis => match wire.key_discriminators {
            Some(key_discriminators) if !key_discriminators.is_empty() => {
                FeedbackDetail::Analysis { key_discriminators }
            }
            _ => FeedbackDetail::General,
        },
        StageKind::Selection => match wire.resources {
            Some(resources) if !resources.is_empty() => FeedbackDetail::Selection { resources },
            _ => FeedbackDetail::General,
        },
        StageKind::Summary | StageKind::Plan | StageKind::Reflection => FeedbackDetail::General,
    };

    Ok(FeedbackRecord::new(stage, for_submission, wire.feedback.trim())
        .with_strengths(fold([wire.strengths]))
        .with_gaps(fold([
            wire.improvements,
            wire.missing_elements,
            wire.missing_diagnoses,
            wire.gaps,
        ]))
        .with_follow_ups(fold([
            wire.follow_up_questions,
            wire.recommended_follow_ups,
            wire.next_steps,
            wire.learning_objectives,
        ]))
        .with_detail(detail))
}
