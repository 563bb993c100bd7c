//! Clinical case context for a guided session.
//!
//! A [`CaseContext`] is an immutable snapshot of the scenario the learner is
//! reasoning about. It is supplied when a session starts and never changes
//! for the session's lifetime.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

/// Maximum allowed case file size in bytes (64KB).
pub const MAX_CASE_SIZE: u64 = 64 * 1024;

/// Patient demographics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Age in years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// Sex as documented in the case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
}

/// The clinical scenario a session is built around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseContext {
    /// Stable identifier of the case.
    pub case_id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Demographics.
    #[serde(default)]
    pub patient: Patient,
    /// Presenting complaint.
    pub chief_complaint: String,
    /// History of present illness and relevant background.
    #[serde(default)]
    pub history: String,
    /// Vital signs keyed by name (ordered for deterministic rendering).
    #[serde(default)]
    pub vital_signs: BTreeMap<String, String>,
    /// Examination findings.
    #[serde(default)]
    pub physical_exam: String,
    /// Laboratory and imaging results.
    #[serde(default)]
    pub investigations: Vec<String>,
    /// Anything else the case author wants the learner to see.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CaseContext {
    /// Creates a minimal case with an id and presenting complaint.
    #[must_use]
    pub fn new(case_id: impl Into<String>, chief_complaint: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            chief_complaint: chief_complaint.into(),
            ..Self::default()
        }
    }

    /// Loads a case from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::CaseNotFound` if the file doesn't exist,
    /// `WorkflowError::CaseTooLarge` past 64KB, `WorkflowError::CaseEncoding`
    /// for non-UTF-8 content, and `WorkflowError::CaseParse` for malformed
    /// JSON or missing required fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkflowError::case_not_found(path)
            } else {
                WorkflowError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_CASE_SIZE {
            return Err(WorkflowError::case_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                WorkflowError::case_encoding(path)
            } else {
                WorkflowError::Io(e)
            }
        })?;

        let case: Self = serde_json::from_str(&content)
            .map_err(|e| WorkflowError::case_parse(path, e.to_string()))?;
        case.validate()
            .map_err(|message| WorkflowError::case_parse(path, message))?;

        tracing::debug!(case_id = %case.case_id, path = %path.display(), "Loaded case");
        Ok(case)
    }

    /// Checks the fields every case must carry.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.case_id.trim().is_empty() {
            return Err("caseId must not be empty".to_string());
        }
        if self.chief_complaint.trim().is_empty() {
            return Err("chiefComplaint must not be empty".to_string());
        }
        Ok(())
    }

    /// Returns the title, falling back to the case id.
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.case_id
        } else {
            &self.title
        }
    }

    /// Renders the case as the narrative text sent to the oracle.
    ///
    /// Output is deterministic for a given case.
    #[must_use]
    pub fn to_case_text(&self) -> String {
        let mut out = String::new();

        let mut who = Vec::new();
        if let Some(age) = self.patient.age {
            who.push(format!("{age}-year-old"));
        }
        if let Some(sex) = self.patient.sex.as_deref().filter(|s| !s.trim().is_empty()) {
            who.push(sex.trim().to_string());
        }
        if who.is_empty() {
            let _ = writeln!(out, "Patient presenting with {}.", self.chief_complaint.trim());
        } else {
            let _ = writeln!(
                out,
                "{} presenting with {}.",
                who.join(" "),
                self.chief_complaint.trim()
            );
        }

        if !self.history.trim().is_empty() {
            let _ = writeln!(out, "History: {}", self.history.trim());
        }
        if !self.vital_signs.is_empty() {
            let vitals: Vec<String> = self
                .vital_signs
                .iter()
                .map(|(name, value)| format!("{name} {value}"))
                .collect();
            let _ = writeln!(out, "Vital signs: {}", vitals.join(", "));
        }
        if !self.physical_exam.trim().is_empty() {
            let _ = writeln!(out, "Examination: {}", self.physical_exam.trim());
        }
        if !self.investigations.is_empty() {
            let _ = writeln!(out, "Investigations: {}", self.investigations.join("; "));
        }
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = writeln!(out, "Notes: {}", notes.trim());
        }

        out.trim_end().to_string()
    }
}
