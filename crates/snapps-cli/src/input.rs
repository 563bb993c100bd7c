//! Learner input: prompt commands, non-interactive scripts, and the replies
//! shown when a command or submission is refused.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use snapps_workflow::{StageDefinition, StageId, StageInput, WorkflowError};

/// What one line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// An answer for the current stage.
    Answer(String),
    /// Empty line: resubmit the retained draft.
    Resubmit,
    /// `:back N`, where `N` is the 1-based stage number.
    Back(usize),
    /// `:transcript`
    Transcript,
    /// `:reset`
    Reset,
    /// `:quit`
    Quit,
    /// A `:` command that could not be understood.
    Unknown(String),
}

impl Command {
    /// Parses one prompt line.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Resubmit;
        }
        let Some(command) = line.strip_prefix(':') else {
            return Self::Answer(line.to_string());
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("back" | "b"), Some(n), None) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Self::Back(n),
                _ => Self::Unknown(line.to_string()),
            },
            (Some("transcript" | "t"), None, None) => Self::Transcript,
            (Some("reset"), None, None) => Self::Reset,
            (Some("quit" | "q" | "exit"), None, None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Converts a typed answer into the input shape `stage` expects.
pub fn answer_for(stage: &StageDefinition, text: &str) -> StageInput {
    if stage.expects_list() {
        StageInput::parse_list(text)
    } else {
        StageInput::text(text.trim())
    }
}

/// The line shown when `:back N` is refused.
///
/// Wiring errors are logged and replaced with a neutral hint.
pub fn back_refusal(number: usize, err: &WorkflowError) -> String {
    if err.is_user_visible() {
        format!("Cannot go back to stage {number}: {err}")
    } else {
        tracing::warn!(stage_number = number, error = %err, "Navigation rejected");
        "You can only go back to a stage you have completed.".to_string()
    }
}

/// The headline shown for a failed submission.
///
/// Wiring errors are logged and replaced with a neutral hint.
pub fn submission_headline(err: &WorkflowError) -> String {
    if err.is_user_visible() {
        format!("Error: {err}")
    } else {
        tracing::warn!(error = %err, "Submission rejected");
        "That action is not available right now. Your answer was kept.".to_string()
    }
}

/// Scripted answers keyed by stage id.
///
/// ```json
/// { "summarize": "58M with crushing chest pain...", "narrow": ["STEMI", "Aortic dissection"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Script {
    answers: BTreeMap<StageId, StageInput>,
}

impl Script {
    /// Reads a script file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read script '{}': {e}\n\nSuggestion: Check the --script path",
                path.display()
            )
        })?;
        Self::parse(&content).map_err(|e| {
            anyhow::anyhow!(
                "Invalid script '{}': {e}\n\nSuggestion: Use an object mapping stage ids to a string or a list of strings",
                path.display()
            )
        })
    }

    /// Parses script JSON.
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Returns the scripted answer for `stage`.
    pub fn answer(&self, stage: StageId) -> Option<&StageInput> {
        self.answers.get(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}
