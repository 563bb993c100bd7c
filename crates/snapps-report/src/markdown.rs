//! Markdown report generation for SNAPPS sessions.
//!
//! This module provides the [`MarkdownGenerator`] struct for converting a
//! [`SessionReport`] into a human-readable Markdown document. The generated
//! report includes:
//!
//! - A summary table with progress metrics
//! - The transcript, one section per stage, with superseded answers marked
//! - The performance summary once the session is complete

use chrono::{DateTime, Utc};
use std::fmt::Write;

use snapps_workflow::{FeedbackDetail, FeedbackRecord, StageInput};

use crate::summary::{BucketItem, PerformanceReport};
use crate::transcript::{StageGroup, TranscriptEntry};
use crate::SessionReport;

/// Generates Markdown reports from SNAPPS sessions.
///
/// Output depends only on the report, so rendering the same report twice
/// produces identical text.
pub struct MarkdownGenerator<'a> {
    report: &'a SessionReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a SessionReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_transcript(&mut output);
        self.write_performance(&mut output);
        self.write_footer(&mut output);

        output
    }

    /// Writes the report to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# SNAPPS Session Report: {}\n",
            escape_markdown(&self.report.case_title)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let progress = &self.report.progress;
        let status = if progress.is_complete() {
            "Completed"
        } else {
            "In progress"
        };

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Workflow | {} |", self.report.workflow);
        let _ = writeln!(output, "| Case | {} |", escape_markdown(&self.report.case_id));
        let _ = writeln!(output, "| Status | {status} |");
        let _ = writeln!(
            output,
            "| Stages | {} of {} ({}%) |",
            progress.completed_stages, progress.total_stages, progress.percent
        );
        let _ = writeln!(
            output,
            "| Submissions | {} |",
            self.report.transcript.entries().count()
        );
        let superseded = self.report.transcript.superseded_count();
        if superseded > 0 {
            let _ = writeln!(output, "| Superseded | {superseded} |");
        }
        let _ = writeln!(
            output,
            "| Started | {} |",
            format_timestamp(&self.report.started_at)
        );
        let _ = writeln!(output);
    }

    fn write_transcript(&self, output: &mut String) {
        let _ = writeln!(output, "## Transcript\n");

        if self.report.transcript.is_empty() {
            let _ = writeln!(output, "*No submissions yet.*\n");
            return;
        }

        for group in &self.report.transcript.groups {
            if !group.entries.is_empty() {
                Self::write_stage_group(output, group);
            }
        }
    }

    fn write_stage_group(output: &mut String, group: &StageGroup) {
        let _ = writeln!(
            output,
            "### {}. {} ({})\n",
            group.order + 1,
            escape_markdown(&group.title),
            group.stage_id
        );

        for entry in &group.entries {
            Self::write_entry(output, entry);
        }
    }

    fn write_entry(output: &mut String, entry: &TranscriptEntry) {
        let submission = &entry.submission;
        let marker = if entry.superseded { " (superseded)" } else { "" };
        let _ = writeln!(
            output,
            "#### Submission {} - pass {}{marker}\n",
            submission.id,
            submission.pass + 1
        );
        let _ = writeln!(
            output,
            "*Submitted {}*\n",
            format_timestamp(&submission.timestamp)
        );
        write_input(output, &submission.raw_input);

        match &entry.feedback {
            Some(feedback) => write_feedback(output, feedback),
            None => {
                let _ = writeln!(output, "*No feedback received.*\n");
            }
        }
    }

    fn write_performance(&self, output: &mut String) {
        let Some(summary) = &self.report.summary else {
            return;
        };

        let _ = writeln!(output, "## Performance Summary\n");
        let _ = writeln!(
            output,
            "Completed {} of {} stages in {}.\n",
            summary.progress.completed_stages,
            summary.progress.total_stages,
            format_duration(summary.duration_seconds)
        );

        write_bucket_section(output, "Strengths", &summary.strengths);
        write_bucket_section(output, "Gaps", &summary.gaps);
        write_bucket_section(output, "Recommended Follow-ups", &summary.follow_ups);
        write_differential(output, summary);

        if summary.superseded_entries > 0 {
            let _ = writeln!(
                output,
                "*{} superseded submission(s) excluded from this summary.*\n",
                summary.superseded_entries
            );
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.updated_at);
        let _ = writeln!(output, "*Session {} last updated {timestamp}*", self.report.session_id);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn write_input(output: &mut String, input: &StageInput) {
    let _ = writeln!(output, "**Response**:\n");
    match input {
        StageInput::Text(text) => {
            for line in text.lines() {
                let _ = writeln!(output, "> {}", escape_markdown(line));
            }
            let _ = writeln!(output);
        }
        StageInput::List(_) => {
            for (index, item) in input.filled_entries().iter().enumerate() {
                let _ = writeln!(output, "{}. {}", index + 1, escape_markdown(item));
            }
            let _ = writeln!(output);
        }
    }
}

fn write_feedback(output: &mut String, feedback: &FeedbackRecord) {
    let _ = writeln!(
        output,
        "**Feedback** ({}):\n",
        format_timestamp(&feedback.received_at)
    );
    if !feedback.guidance.trim().is_empty() {
        let _ = writeln!(output, "{}\n", escape_markdown(feedback.guidance.trim()));
    }

    write_list(output, "Strengths", &feedback.strengths);
    write_list(output, "Gaps", &feedback.gaps);
    write_list(output, "Follow-ups", &feedback.follow_ups);

    match &feedback.detail {
        FeedbackDetail::General => {}
        FeedbackDetail::Differential { evaluated } => {
            let _ = writeln!(output, "| Diagnosis | Plausibility | Rationale |");
            let _ = writeln!(output, "|-----------|--------------|-----------|");
            for diagnosis in evaluated {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} |",
                    escape_markdown(&diagnosis.diagnosis),
                    diagnosis.plausibility,
                    diagnosis
                        .rationale
                        .as_deref()
                        .map(escape_markdown)
                        .unwrap_or_default()
                );
            }
            let _ = writeln!(output);
        }
        FeedbackDetail::Analysis { key_discriminators } => {
            write_list(output, "Key discriminators", key_discriminators);
        }
        FeedbackDetail::Probe { answers } => {
            for answer in answers {
                let _ = writeln!(output, "- **Q**: {}", escape_markdown(&answer.question));
                let _ = writeln!(output, "  **A**: {}", escape_markdown(&answer.answer));
            }
            let _ = writeln!(output);
        }
        FeedbackDetail::Selection { resources } => {
            write_list(output, "Resources", resources);
        }
    }
}

fn write_list(output: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(output, "*{label}*:\n");
    for item in items {
        let _ = writeln!(output, "- {}", escape_markdown(item));
    }
    let _ = writeln!(output);
}

fn write_bucket_section(output: &mut String, title: &str, items: &[BucketItem]) {
    let _ = writeln!(output, "### {title}\n");

    if items.is_empty() {
        let _ = writeln!(output, "*None*\n");
        return;
    }

    for item in items {
        let _ = writeln!(output, "- **[{}]** {}", item.stage, escape_markdown(&item.text));
    }
    let _ = writeln!(output);
}

fn write_differential(output: &mut String, summary: &PerformanceReport) {
    if summary.differential.is_empty() {
        return;
    }
    let _ = writeln!(output, "### Differential\n");
    for diagnosis in &summary.differential {
        let _ = writeln!(
            output,
            "- {} ({})",
            escape_markdown(&diagnosis.diagnosis),
            diagnosis.plausibility
        );
    }
    let _ = writeln!(output);
}

/// Formats a duration in seconds to a human-readable string.
///
/// Examples:
/// - 65 seconds -> "1m 5s"
/// - 3661 seconds -> "1h 1m 1s"
/// - 45 seconds -> "45s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes special Markdown characters so learner and oracle text renders literally.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
