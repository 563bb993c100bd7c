//! Normalized oracle feedback.
//!
//! Whatever shape the oracle answers with, the gateway folds it into a
//! [`FeedbackRecord`]: a guidance string, three canonical buckets (strengths,
//! gaps, follow-ups), and stage-specific detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::StageId;
use crate::session::SubmissionId;

// ============================================================================
// Plausibility
// ============================================================================

/// Plausibility tag attached to an evaluated diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plausibility {
    /// Well supported by the findings.
    Likely,
    /// Consistent with some findings.
    Possible,
    /// Poorly supported.
    Unlikely,
    /// Dangerous diagnosis that must be excluded regardless of likelihood.
    MustNotMiss,
}

impl Plausibility {
    /// Parses a tag, case-insensitively, accepting the oracle's synonyms.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "likely" | "high" | "probable" => Some(Self::Likely),
            "possible" | "moderate" | "medium" => Some(Self::Possible),
            "unlikely" | "low" | "improbable" => Some(Self::Unlikely),
            "must_not_miss" | "cant_miss" | "can't_miss" | "critical" => Some(Self::MustNotMiss),
            _ => None,
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Likely => "Likely",
            Self::Possible => "Possible",
            Self::Unlikely => "Unlikely",
            Self::MustNotMiss => "Must not miss",
        }
    }
}

impl std::fmt::Display for Plausibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl<'de> Deserialize<'de> for Plausibility {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid plausibility '{s}': expected one of 'likely', 'possible', 'unlikely', 'must_not_miss'"
            ))
        })
    }
}

impl Serialize for Plausibility {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Likely => "likely",
            Self::Possible => "possible",
            Self::Unlikely => "unlikely",
            Self::MustNotMiss => "must_not_miss",
        };
        serializer.serialize_str(s)
    }
}

// ============================================================================
// Stage-specific detail
// ============================================================================

/// One diagnosis from the learner's differential, as judged by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedDiagnosis {
    /// Diagnosis as named by the learner (or added by the oracle).
    pub diagnosis: String,
    /// Plausibility tag.
    pub plausibility: Plausibility,
    /// Why the tag was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// The oracle's answer to one learner question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeAnswer {
    /// The question as asked.
    pub question: String,
    /// The answer.
    pub answer: String,
}

/// Stage-specific structured feedback beyond the canonical buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackDetail {
    /// Nothing beyond guidance and buckets.
    #[default]
    General,
    /// Evaluated differential.
    Differential {
        /// Each diagnosis with its plausibility tag.
        evaluated: Vec<EvaluatedDiagnosis>,
    },
    /// Compare-and-contrast critique.
    Analysis {
        /// Findings that best separate the candidate diagnoses.
        key_discriminators: Vec<String>,
    },
    /// Answers to probing questions.
    Probe {
        /// Question/answer pairs.
        answers: Vec<ProbeAnswer>,
    },
    /// Learning-issue guidance.
    Selection {
        /// Suggested reading or resources.
        resources: Vec<String>,
    },
}

// ============================================================================
// FeedbackRecord
// ============================================================================

/// The oracle's structured response to one submission. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Stage the feedback is for.
    pub stage_id: StageId,
    /// Submission this feedback answers (lookup only).
    pub for_submission: SubmissionId,
    /// When the oracle's response was received.
    pub received_at: DateTime<Utc>,
    /// Free-text guidance.
    pub guidance: String,
    /// What the learner did well.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// What was missing or could improve.
    #[serde(default)]
    pub gaps: Vec<String>,
    /// Recommended follow-ups and questions.
    #[serde(default)]
    pub follow_ups: Vec<String>,
    /// Stage-specific detail.
    #[serde(default)]
    pub detail: FeedbackDetail,
}

impl FeedbackRecord {
    /// Creates a record with guidance only, received now.
    #[must_use]
    pub fn new(stage_id: StageId, for_submission: SubmissionId, guidance: impl Into<String>) -> Self {
        Self {
            stage_id,
            for_submission,
            received_at: Utc::now(),
            guidance: guidance.into(),
            strengths: Vec::new(),
            gaps: Vec::new(),
            follow_ups: Vec::new(),
            detail: FeedbackDetail::General,
        }
    }

    /// Sets the strengths bucket.
    #[must_use]
    pub fn with_strengths(mut self, strengths: Vec<String>) -> Self {
        self.strengths = strengths;
        self
    }

    /// Sets the gaps bucket.
    #[must_use]
    pub fn with_gaps(mut self, gaps: Vec<String>) -> Self {
        self.gaps = gaps;
        self
    }

    /// Sets the follow-ups bucket.
    #[must_use]
    pub fn with_follow_ups(mut self, follow_ups: Vec<String>) -> Self {
        self.follow_ups = follow_ups;
        self
    }

    /// Sets the stage-specific detail.
    #[must_use]
    pub fn with_detail(mut self, detail: FeedbackDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Returns the evaluated differential, if this is differential feedback.
    #[must_use]
    pub fn evaluated_differential(&self) -> &[EvaluatedDiagnosis] {
        match &self.detail {
            FeedbackDetail::Differential { evaluated } => evaluated,
            _ => &[],
        }
    }
}
