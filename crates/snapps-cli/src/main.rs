//! SNAPPS CLI
//!
//! Runs one guided clinical-case session in the terminal against the
//! configured feedback oracle.

mod input;

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use snapps_report::{json::JsonGenerator, MarkdownGenerator, SessionReport};
use snapps_workflow::{
    Action, CaseContext, Config, EnvToken, FeedbackDetail, FeedbackOracle, FeedbackRecord,
    HttpOracleGateway, Outcome, SessionState, StageDefinition, StageErrorKind, StageInput,
    TokenProvider, WorkflowError, WorkflowEvent, WorkflowKind, WorkflowOrchestrator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing_subscriber::EnvFilter;

use crate::input::{answer_for, back_refusal, submission_headline, Command, Script};

/// SNAPPS - Guided Clinical Reasoning Sessions
///
/// Walks a learner through a staged clinical case (Summarize, Narrow, Analyze,
/// Probe, Plan, Select) and collects oracle feedback on every stage.
#[derive(Parser, Debug)]
#[command(name = "snapps")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the case JSON file (default: caseFile from the config)
    #[arg(value_name = "CASE")]
    case: Option<String>,

    /// Path to configuration file (default: snapps.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Workflow to run: snapps, metacognition or transfer
    #[arg(short, long, value_name = "KIND")]
    workflow: Option<String>,

    /// Output directory for reports
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// JSON file mapping stage ids to answers, for non-interactive runs
    #[arg(short, long, value_name = "FILE")]
    script: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");
    tracing::debug!(script = ?args.script, "Script file");

    match run_session(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads config and case, runs the session, and writes the reports.
async fn run_session(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref case) = args.case {
        config.case_file.clone_from(case);
    }
    if let Some(ref output_dir) = args.output_dir {
        config.output_dir.clone_from(output_dir);
    }
    if let Some(ref workflow) = args.workflow {
        config.workflow = WorkflowKind::from_str_case_insensitive(workflow).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown workflow '{workflow}'\n\nSuggestion: Use one of 'snapps', 'metacognition', 'transfer'"
            )
        })?;
    }

    // Re-validate after overrides
    config.validate()?;
    print_config(&config);

    let case = CaseContext::load(&config.case_file)?;
    print_case(&case);

    let script = args
        .script
        .as_deref()
        .map(|path| Script::load(Path::new(path)))
        .transpose()?;

    let tokens: Arc<dyn TokenProvider> = Arc::new(EnvToken::new(config.oracle.token_env.clone()));
    let oracle: Arc<dyn FeedbackOracle> =
        Arc::new(HttpOracleGateway::from_config(&config.oracle, tokens));
    let mut orchestrator = WorkflowOrchestrator::from_config(&config, oracle);
    spawn_event_logger(orchestrator.subscribe());

    orchestrator.dispatch(Action::Initialize(case.clone()))?;

    let completed = match script {
        Some(script) => run_scripted(&mut orchestrator, &script).await?,
        None => run_interactive(&mut orchestrator, &case, &config).await?,
    };

    match orchestrator.session() {
        Some(session) if completed => generate_reports(session, Path::new(&config.output_dir)),
        _ => {
            println!();
            println!("Session ended before completion; no report written.");
            Ok(())
        }
    }
}

/// Answers every stage from `script`. Any failure ends the run.
async fn run_scripted(
    orchestrator: &mut WorkflowOrchestrator,
    script: &Script,
) -> anyhow::Result<bool> {
    if script.is_empty() {
        anyhow::bail!("Script has no answers\n\nSuggestion: Map each stage id to an answer");
    }

    while let Some(stage) = orchestrator.current_stage().cloned() {
        print_stage(&stage, orchestrator.catalog().len());
        let Some(answer) = script.answer(stage.id) else {
            anyhow::bail!(
                "Script has no answer for stage '{}'\n\nSuggestion: Add a \"{}\" entry to the script",
                stage.id,
                stage.id.as_str()
            );
        };
        println!("> {}", answer.as_text());

        let outcome = orchestrator.submit(answer.clone()).await?;
        print_latest_feedback(orchestrator.session());
        if matches!(outcome, Outcome::Completed) {
            break;
        }
    }

    Ok(orchestrator.is_complete())
}

/// Reads answers and commands from stdin until completion, `:quit` or EOF.
async fn run_interactive(
    orchestrator: &mut WorkflowOrchestrator,
    case: &CaseContext,
    config: &Config,
) -> anyhow::Result<bool> {
    println!();
    println!("Commands: :back N, :transcript, :reset, :quit. An empty line resubmits the last answer.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown: Option<(usize, u32)> = None;

    loop {
        if orchestrator.is_complete() {
            return Ok(true);
        }
        let Some(stage) = orchestrator.current_stage().cloned() else {
            return Ok(false);
        };
        let pass = orchestrator.session().map_or(0, SessionState::pass);
        if shown != Some((stage.order, pass)) {
            print_stage(&stage, orchestrator.catalog().len());
            if let Some(draft) = orchestrator.draft() {
                println!("(Previous answer: {}. Press Enter to reuse it.)", draft.as_text());
            }
            shown = Some((stage.order, pass));
        }

        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                None
            }
        };
        let Some(line) = line else {
            return Ok(false);
        };

        match Command::parse(&line) {
            Command::Quit => return Ok(false),
            Command::Transcript => print_transcript(orchestrator.session()),
            Command::Reset => {
                orchestrator.dispatch(Action::Reset)?;
                orchestrator.dispatch(Action::Initialize(case.clone()))?;
                shown = None;
                println!("Session reset. Starting over.");
            }
            Command::Back(number) => {
                if let Err(e) = orchestrator.dispatch(Action::Navigate(number - 1)) {
                    println!("{}", back_refusal(number, &e));
                }
            }
            Command::Resubmit => match orchestrator.draft().cloned() {
                Some(draft) => submit_stage(orchestrator, draft, config).await,
                None => println!("Nothing to resubmit. Type your answer."),
            },
            Command::Answer(text) => {
                submit_stage(orchestrator, answer_for(&stage, &text), config).await;
            }
            Command::Unknown(command) => {
                println!("Unknown command '{command}'. Try :back N, :transcript, :reset or :quit.");
            }
        }
    }
}

/// Submits one answer and prints the feedback or the error with its hint.
async fn submit_stage(
    orchestrator: &mut WorkflowOrchestrator,
    answer: StageInput,
    config: &Config,
) {
    println!("Waiting for feedback...");
    match orchestrator.submit(answer).await {
        Ok(Outcome::Advanced { .. } | Outcome::Completed) => {
            print_latest_feedback(orchestrator.session());
        }
        Ok(outcome) => tracing::debug!(?outcome, "Submission produced no feedback"),
        Err(e) => print_submission_error(orchestrator, &e, config),
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Logs every workflow event at debug level.
fn spawn_event_logger(mut events: Receiver<WorkflowEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(event = event.event_name(), "Workflow event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Workflow: {}", config.workflow);
    println!("  Case file: {}", config.case_file);
    println!("  Output directory: {}", config.output_dir);
    println!("  Oracle: {}", config.oracle.base_url);
    println!("  Timeout: {}s", config.oracle.timeout_seconds);
    println!("  Token variable: {}", config.oracle.token_env);
}

fn print_case(case: &CaseContext) {
    println!();
    println!("=== {} ===", case.display_title());
    println!("{}", case.to_case_text());
}

fn print_stage(stage: &StageDefinition, stage_count: usize) {
    println!();
    println!(
        "--- Stage {} of {}: {} ---",
        stage.order + 1,
        stage_count,
        stage.title
    );
    println!("{}", stage.prompt);
    if stage.expects_list() {
        println!("(Separate entries with ';')");
    }
}

fn print_latest_feedback(session: Option<&SessionState>) {
    let Some(feedback) = session.and_then(|s| s.feedback().last()) else {
        return;
    };
    print_feedback(feedback);
}

fn print_feedback(feedback: &FeedbackRecord) {
    println!();
    println!("Feedback ({}):", feedback.stage_id);
    if !feedback.guidance.trim().is_empty() {
        println!("  {}", feedback.guidance.trim());
    }
    print_items("Strengths", &feedback.strengths);
    print_items("Gaps", &feedback.gaps);
    print_items("Follow-ups", &feedback.follow_ups);

    match &feedback.detail {
        FeedbackDetail::Differential { evaluated } => {
            println!("  Differential:");
            for diagnosis in evaluated {
                match &diagnosis.rationale {
                    Some(rationale) => println!(
                        "    - {} [{}]: {rationale}",
                        diagnosis.diagnosis, diagnosis.plausibility
                    ),
                    None => println!("    - {} [{}]", diagnosis.diagnosis, diagnosis.plausibility),
                }
            }
        }
        FeedbackDetail::Analysis { key_discriminators } => {
            print_items("Key discriminators", key_discriminators);
        }
        FeedbackDetail::Probe { answers } => {
            println!("  Answers:");
            for answer in answers {
                println!("    Q: {}", answer.question);
                println!("    A: {}", answer.answer);
            }
        }
        FeedbackDetail::Selection { resources } => print_items("Resources", resources),
        FeedbackDetail::General => {}
    }
}

fn print_items(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {label}:");
    for item in items {
        println!("    - {item}");
    }
}

fn print_submission_error(orchestrator: &WorkflowOrchestrator, err: &WorkflowError, config: &Config) {
    println!();
    println!("{}", submission_headline(err));
    if !err.is_user_visible() {
        return;
    }

    let Some(stage_error) = orchestrator.error() else {
        return;
    };
    match stage_error.kind {
        StageErrorKind::Validation => println!("Revise your answer and try again."),
        StageErrorKind::Authentication => println!(
            "Sign in again: export a fresh token in {} and press Enter to resubmit.",
            config.oracle.token_env
        ),
        StageErrorKind::Unavailable => println!("Press Enter to resubmit the same answer."),
        StageErrorKind::Contract | StageErrorKind::Internal => {
            println!("Your answer was kept. Press Enter to try again.");
        }
    }
}

fn print_transcript(session: Option<&SessionState>) {
    let Some(session) = session else {
        return;
    };
    let report = SessionReport::from_session(session);
    println!();
    println!("{}", MarkdownGenerator::new(&report).generate());
}

/// Writes the Markdown and JSON reports to `output_dir`.
fn generate_reports(session: &SessionState, output_dir: &Path) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    let report = SessionReport::from_session(session);

    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join("snapps-report.md");
    MarkdownGenerator::new(&report).write_to_file(&md_path)?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join("snapps-report.json");
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    if let Some(summary) = &report.summary {
        println!();
        println!("=== Session Summary ===");
        println!(
            "Stages: {} of {}",
            summary.progress.completed_stages, summary.progress.total_stages
        );
        println!("Strengths: {}", summary.strengths.len());
        println!("Gaps: {}", summary.gaps.len());
        println!("Follow-ups: {}", summary.follow_ups.len());
        if summary.superseded_entries > 0 {
            println!("Superseded submissions: {}", summary.superseded_entries);
        }
    }

    Ok(())
}
