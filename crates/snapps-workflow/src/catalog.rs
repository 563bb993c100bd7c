//! Stage catalog for guided case workflows.
//!
//! A catalog is the fixed, ordered list of stages a learner walks through.
//! Catalogs are built once and never mutated; [`WorkflowKind`] selects one of
//! the built-in workflows.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

// ============================================================================
// StageId
// ============================================================================

/// Symbolic key of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Summarize the history and findings.
    Summarize,
    /// Narrow the differential to two or three possibilities.
    Narrow,
    /// Analyze the differential by comparing and contrasting.
    Analyze,
    /// Probe the preceptor about uncertainties.
    Probe,
    /// Plan management for the patient.
    Plan,
    /// Select an issue for self-directed learning.
    Select,
    /// Predict the outcome before reasoning it through.
    Predict,
    /// Monitor the cues that would change the prediction.
    Monitor,
    /// Reflect on how the reasoning changed.
    Reflect,
    /// Recall the principle from the source component.
    Recall,
    /// Map case features onto the recalled principle.
    Bridge,
    /// Apply the principle to the new case.
    Transfer,
}

impl StageId {
    /// Returns the wire name of the stage (`snake_case`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Narrow => "narrow",
            Self::Analyze => "analyze",
            Self::Probe => "probe",
            Self::Plan => "plan",
            Self::Select => "select",
            Self::Predict => "predict",
            Self::Monitor => "monitor",
            Self::Reflect => "reflect",
            Self::Recall => "recall",
            Self::Bridge => "bridge",
            Self::Transfer => "transfer",
        }
    }

    /// Returns the oracle contract this stage is evaluated under.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::Summarize => StageKind::Summary,
            Self::Narrow => StageKind::Differential,
            Self::Analyze => StageKind::Analysis,
            Self::Probe => StageKind::Probe,
            Self::Plan => StageKind::Plan,
            Self::Select => StageKind::Selection,
            Self::Predict
            | Self::Monitor
            | Self::Reflect
            | Self::Recall
            | Self::Bridge
            | Self::Transfer => StageKind::Reflection,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Request/response contract family of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Case summary critique.
    Summary,
    /// Differential evaluation with plausibility tags.
    Differential,
    /// Compare-and-contrast critique.
    Analysis,
    /// Answers to the learner's questions.
    Probe,
    /// Management plan critique.
    Plan,
    /// Learning-issue guidance.
    Selection,
    /// Generic reflective critique (metacognition and transfer workflows).
    Reflection,
}

// ============================================================================
// WorkflowKind
// ============================================================================

/// Built-in guided workflows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    /// Summarize, Narrow, Analyze, Probe, Plan, Select.
    #[default]
    Snapps,
    /// Predict, Monitor, Reflect.
    Metacognition,
    /// Cross-component transfer: Recall, Bridge, Transfer.
    Transfer,
}

impl WorkflowKind {
    /// Parses a string into a `WorkflowKind`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "snapps" => Some(Self::Snapps),
            "metacognition" => Some(Self::Metacognition),
            "transfer" | "cross_component_transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    /// Returns the wire name of the workflow.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Snapps => "snapps",
            Self::Metacognition => "metacognition",
            Self::Transfer => "transfer",
        }
    }

    /// Builds the stage catalog for this workflow.
    #[must_use]
    pub fn catalog(self) -> StageCatalog {
        let stages = match self {
            Self::Snapps => snapps_stages(),
            Self::Metacognition => metacognition_stages(),
            Self::Transfer => transfer_stages(),
        };
        StageCatalog {
            workflow: self,
            stages: stages.into(),
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid workflow '{s}': expected one of 'snapps', 'metacognition', 'transfer'"
            ))
        })
    }
}

impl Serialize for WorkflowKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// StageInput
// ============================================================================

static LIST_MARKER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").ok());

/// Raw learner input for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageInput {
    /// Free text.
    Text(String),
    /// Short entries, one per slot.
    List(Vec<String>),
}

impl StageInput {
    /// Creates a text input.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates a list input.
    #[must_use]
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Splits typed text into list entries.
    ///
    /// Entries are separated by newlines or `;`. Leading enumeration markers
    /// (`1.`, `2)`, `-`, `*`) are stripped and blank entries dropped.
    #[must_use]
    pub fn parse_list(text: &str) -> Self {
        let items = text
            .split(['\n', ';'])
            .map(|entry| match LIST_MARKER.as_ref() {
                Some(re) => re.replace(entry, "").trim().to_string(),
                None => entry.trim().to_string(),
            })
            .filter(|entry| !entry.is_empty())
            .collect();
        Self::List(items)
    }

    /// Returns the trimmed, non-blank list entries (empty for text input).
    #[must_use]
    pub fn filled_entries(&self) -> Vec<String> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::List(items) => items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Returns the trimmed text (entries joined with `; ` for list input).
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::List(_) => self.filled_entries().join("; "),
        }
    }

    /// Returns `true` if nothing meaningful was entered.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(_) => self.filled_entries().is_empty(),
        }
    }
}

// ============================================================================
// InputRequirement
// ============================================================================

/// Predicate a stage's input must satisfy before it may be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum InputRequirement {
    /// Free text with at least `min_chars` non-whitespace-trimmed characters.
    Text {
        /// Minimum trimmed length.
        min_chars: usize,
    },
    /// A list with `slots` entries of which at least `min_filled` are populated.
    List {
        /// Number of entry slots offered to the learner.
        slots: usize,
        /// Minimum populated slots.
        min_filled: usize,
    },
}

impl InputRequirement {
    /// Non-empty free text.
    pub const NON_EMPTY_TEXT: Self = Self::Text { min_chars: 1 };

    /// Checks `input` against this requirement for `stage`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Validation` describing what is missing.
    pub fn check(&self, stage: StageId, input: &StageInput) -> Result<()> {
        match (self, input) {
            (Self::Text { min_chars }, StageInput::Text(text)) => {
                let len = text.trim().chars().count();
                if len < *min_chars {
                    let message = if len == 0 {
                        "no text entered".to_string()
                    } else {
                        format!("{len} characters entered, at least {min_chars} required")
                    };
                    return Err(WorkflowError::validation(
                        stage,
                        message,
                        "Write your response before submitting",
                    ));
                }
                Ok(())
            }
            (Self::List { slots, min_filled }, StageInput::List(_)) => {
                let filled = input.filled_entries().len();
                if filled < *min_filled {
                    return Err(WorkflowError::validation(
                        stage,
                        format!("{filled} of {slots} entries provided, at least {min_filled} required"),
                        format!("Fill in at least {min_filled} entries"),
                    ));
                }
                if filled > *slots {
                    return Err(WorkflowError::validation(
                        stage,
                        format!("{filled} entries provided, at most {slots} allowed"),
                        format!("Keep only your {slots} most relevant entries"),
                    ));
                }
                Ok(())
            }
            (Self::Text { .. }, StageInput::List(_)) => Err(WorkflowError::validation(
                stage,
                "expected free text, got a list",
                "Enter your response as text",
            )),
            (Self::List { .. }, StageInput::Text(_)) => Err(WorkflowError::validation(
                stage,
                "expected a list of entries, got free text",
                "Enter one entry per slot",
            )),
        }
    }

    /// Returns `true` if `input` satisfies the requirement.
    #[must_use]
    pub fn is_satisfied_by(&self, input: &StageInput) -> bool {
        // The stage id only affects the error text.
        self.check(StageId::Summarize, input).is_ok()
    }
}

// ============================================================================
// StageDefinition
// ============================================================================

/// One stage of a workflow. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique symbolic key.
    pub id: StageId,
    /// Position in the sequence (0-based, contiguous).
    pub order: usize,
    /// Short title shown above the input.
    pub title: String,
    /// Instruction shown to the learner.
    pub prompt: String,
    /// Predicate the raw input must satisfy.
    pub input_required: InputRequirement,
}

impl StageDefinition {
    /// Creates a stage definition.
    #[must_use]
    pub fn new(
        id: StageId,
        order: usize,
        title: impl Into<String>,
        prompt: impl Into<String>,
        input_required: InputRequirement,
    ) -> Self {
        Self {
            id,
            order,
            title: title.into(),
            prompt: prompt.into(),
            input_required,
        }
    }

    /// Returns `true` if the stage expects a list of entries.
    #[must_use]
    pub const fn expects_list(&self) -> bool {
        matches!(self.input_required, InputRequirement::List { .. })
    }
}

// ============================================================================
// StageCatalog
// ============================================================================

/// Fixed, ordered list of stages. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    workflow: WorkflowKind,
    stages: Arc<[StageDefinition]>,
}

impl StageCatalog {
    /// Builds a custom catalog, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::ConfigValidation` if the list is empty, a stage
    /// id repeats, or `order` values are not contiguous from 0.
    pub fn new(workflow: WorkflowKind, stages: Vec<StageDefinition>) -> Result<Self> {
        if stages.is_empty() {
            return Err(WorkflowError::config_validation(
                "stage catalog must not be empty",
                "Define at least one stage",
            ));
        }
        for (index, stage) in stages.iter().enumerate() {
            if stage.order != index {
                return Err(WorkflowError::config_validation(
                    format!(
                        "stage {} has order {} at position {index}",
                        stage.id, stage.order
                    ),
                    "Stage orders must be strictly increasing and contiguous from 0",
                ));
            }
            if stages[..index].iter().any(|s| s.id == stage.id) {
                return Err(WorkflowError::config_validation(
                    format!("stage {} appears more than once", stage.id),
                    "Give every stage a unique id",
                ));
            }
        }
        Ok(Self {
            workflow,
            stages: stages.into(),
        })
    }

    /// Returns the workflow this catalog belongs to.
    #[must_use]
    pub const fn workflow(&self) -> WorkflowKind {
        self.workflow
    }

    /// Returns the ordered stage list.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the catalog has no stages (never for a validated catalog).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage at `index`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::StageOutOfRange` for an index past the end.
    pub fn stage_at(&self, index: usize) -> Result<&StageDefinition> {
        self.stages.get(index).ok_or(WorkflowError::StageOutOfRange {
            index,
            count: self.stages.len(),
        })
    }

    /// Returns `true` if `index` is the final stage.
    #[must_use]
    pub fn is_last_stage(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn find(&self, id: StageId) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Returns the position of a stage id in this catalog.
    #[must_use]
    pub fn index_of(&self, id: StageId) -> Option<usize> {
        self.find(id).map(|s| s.order)
    }
}

fn snapps_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(
            StageId::Summarize,
            0,
            "Summarize",
            "Summarize the history and findings in a few sentences.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
        StageDefinition::new(
            StageId::Narrow,
            1,
            "Narrow the differential",
            "Narrow the differential to two or three relevant possibilities.",
            InputRequirement::List {
                slots: 3,
                min_filled: 2,
            },
        ),
        StageDefinition::new(
            StageId::Analyze,
            2,
            "Analyze the differential",
            "Analyze the differential by comparing and contrasting the possibilities.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
        StageDefinition::new(
            StageId::Probe,
            3,
            "Probe the preceptor",
            "Probe the preceptor about uncertainties, difficulties, or alternative approaches.",
            InputRequirement::List {
                slots: 3,
                min_filled: 1,
            },
        ),
        StageDefinition::new(
            StageId::Plan,
            4,
            "Plan management",
            "Plan management for the patient's medical issues.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
        StageDefinition::new(
            StageId::Select,
            5,
            "Select a learning issue",
            "Select a case-related issue for self-directed learning.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
    ]
}

fn metacognition_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(
            StageId::Predict,
            0,
            "Predict",
            "State your leading diagnosis and how confident you are in it.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
        StageDefinition::new(
            StageId::Monitor,
            1,
            "Monitor",
            "List the findings that would make you change your mind.",
            InputRequirement::List {
                slots: 4,
                min_filled: 2,
            },
        ),
        StageDefinition::new(
            StageId::Reflect,
            2,
            "Reflect",
            "Reflect on how your reasoning changed and what you would do differently.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
    ]
}

fn transfer_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(
            StageId::Recall,
            0,
            "Recall",
            "Recall the underlying principle from the foundational component.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
        StageDefinition::new(
            StageId::Bridge,
            1,
            "Bridge",
            "Map features of this case onto that principle.",
            InputRequirement::List {
                slots: 4,
                min_filled: 2,
            },
        ),
        StageDefinition::new(
            StageId::Transfer,
            2,
            "Transfer",
            "Apply the principle to explain this patient's presentation.",
            InputRequirement::NON_EMPTY_TEXT,
        ),
    ]
}
