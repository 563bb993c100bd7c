//! End-to-end session tests.
//!
//! Each test drives a `WorkflowOrchestrator` through `HttpOracleGateway`
//! against the in-process mock oracle.

mod mock_oracle;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mock_oracle::{fixture, MockOracle, Reply, TEST_TOKEN};
use snapps_report::{json::JsonGenerator, MarkdownGenerator, SessionReport, SummaryView};
use snapps_workflow::{
    Action, CaseContext, Config, FeedbackDetail, FeedbackOracle, HttpOracleGateway, Outcome,
    StageErrorKind, StageId, StageInput, StaticToken, WorkflowError, WorkflowKind,
    WorkflowOrchestrator, WorkflowState,
};
use tokio_test::{assert_err, assert_ok};

fn load_case() -> CaseContext {
    CaseContext::load(fixture("case.json")).expect("Failed to load case fixture")
}

fn gateway(base_url: &str) -> Arc<dyn FeedbackOracle> {
    Arc::new(HttpOracleGateway::new(
        base_url,
        Arc::new(StaticToken::new(TEST_TOKEN)),
        Duration::from_secs(5),
    ))
}

async fn started(mock: &MockOracle, workflow: WorkflowKind) -> WorkflowOrchestrator {
    let base_url = mock.spawn().await;
    let mut orchestrator = WorkflowOrchestrator::new(workflow.catalog(), gateway(&base_url));
    assert_ok!(orchestrator.dispatch(Action::Initialize(load_case())));
    orchestrator
}

fn answer(stage: StageId) -> StageInput {
    match stage {
        StageId::Narrow => StageInput::list(["Anterior STEMI", "Aortic dissection"]),
        StageId::Probe => StageInput::list(["Should I get a CT angiogram before the cath lab?"]),
        StageId::Monitor | StageId::Bridge => StageInput::list(["First cue", "Second cue"]),
        other => StageInput::text(format!("My answer for {other}")),
    }
}

/// Submits the scripted answer for each stage until `count` stages are done.
async fn complete_stages(orchestrator: &mut WorkflowOrchestrator, count: usize) {
    for _ in 0..count {
        let stage = orchestrator
            .current_stage()
            .map(|s| s.id)
            .expect("No active stage");
        orchestrator
            .submit(answer(stage))
            .await
            .unwrap_or_else(|e| panic!("Stage {stage} failed: {e}"));
    }
}

// ============================================================================
// Happy path
// ============================================================================

/// Six valid submissions complete the session and the summary renders.
#[tokio::test]
async fn test_full_snapps_session() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;

    complete_stages(&mut orchestrator, 6).await;

    assert!(orchestrator.is_complete());
    let session = orchestrator.session().expect("Session missing");
    assert!(session.is_complete());
    assert_eq!(session.submissions().len(), 6);
    assert_eq!(session.feedback().len(), 6);

    // Stage order is non-decreasing and starts at 0.
    let orders: Vec<_> = session.submissions().iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3, 4, 5]);

    let summary = SummaryView::from_session(session).expect("Summary should render");
    assert_eq!(summary.progress.percent, 100);
    assert!(summary
        .gaps
        .iter()
        .any(|g| g.text == "Pulmonary embolism" && g.stage == StageId::Narrow));
    assert!(summary
        .follow_ups
        .iter()
        .any(|f| f.text == "Door-to-balloon under 90 minutes"));
    assert_eq!(summary.differential.len(), 2);

    let report = SessionReport::from_session(session);
    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("# SNAPPS Session Report: Chest pain in the emergency department"));
    assert!(markdown.contains("## Performance Summary"));
    assert_ok!(JsonGenerator::new(&report).generate());

    assert_eq!(mock.requests().len(), 6);
}

/// Each request carries the bearer token and the context its stage needs.
#[tokio::test]
async fn test_requests_carry_accumulated_context() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;

    complete_stages(&mut orchestrator, 4).await;

    let requests = mock.requests();
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer test-token")));
    assert!(requests.iter().all(|r| r.workflow == "snapps"));

    let summarize = &requests[0].body;
    assert_eq!(summarize["stage"], "summarize");
    assert_eq!(summarize["summary"], "My answer for SUMMARIZE");
    assert!(summarize["case_text"]
        .as_str()
        .unwrap_or_default()
        .contains("Crushing substernal chest pain"));

    let narrow = &requests[1].body;
    assert_eq!(narrow["summary"], "My answer for SUMMARIZE");
    assert_eq!(
        narrow["differential"],
        serde_json::json!(["Anterior STEMI", "Aortic dissection"])
    );

    let probe = &requests[3].body;
    assert_eq!(probe["analysis"], "My answer for ANALYZE");
    assert_eq!(
        probe["questions"],
        serde_json::json!(["Should I get a CT angiogram before the cath lab?"])
    );
}

/// Answers read from the script fixture complete the workflow.
#[tokio::test]
async fn test_script_fixture_completes_session() {
    let content = std::fs::read_to_string(fixture("script.json")).expect("Failed to read script");
    let script: BTreeMap<StageId, StageInput> =
        serde_json::from_str(&content).expect("Failed to parse script");

    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;

    while let Some(stage) = orchestrator.current_stage().map(|s| s.id) {
        let input = script.get(&stage).cloned().expect("Script missing stage");
        assert_ok!(orchestrator.submit(input).await);
    }

    assert!(orchestrator.is_complete());
}

/// A non-SNAPPS workflow posts to its own endpoints.
#[tokio::test]
async fn test_metacognition_workflow() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Metacognition).await;

    complete_stages(&mut orchestrator, 3).await;

    assert!(orchestrator.is_complete());
    let requests = mock.requests();
    let stages: Vec<_> = requests
        .iter()
        .map(|r| format!("{}/{}", r.workflow, r.stage))
        .collect();
    assert_eq!(
        stages,
        vec![
            "metacognition/predict",
            "metacognition/monitor",
            "metacognition/reflect"
        ]
    );
    let reflect = &requests[2].body;
    assert_eq!(reflect["prior_responses"].as_array().map(Vec::len), Some(2));
}

/// The cross-component transfer workflow runs RECALL, BRIDGE, TRANSFER to completion.
#[tokio::test]
async fn test_transfer_workflow() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Transfer).await;

    let err = assert_err!(orchestrator.submit(StageInput::text("   ")).await);
    assert!(matches!(
        err,
        WorkflowError::Validation {
            stage: StageId::Recall,
            ..
        }
    ));
    assert!(mock.requests().is_empty());

    complete_stages(&mut orchestrator, 3).await;

    assert!(orchestrator.is_complete());
    assert!(matches!(orchestrator.state(), WorkflowState::Completed));
    let requests = mock.requests();
    let stages: Vec<_> = requests
        .iter()
        .map(|r| format!("{}/{}", r.workflow, r.stage))
        .collect();
    assert_eq!(
        stages,
        vec!["transfer/recall", "transfer/bridge", "transfer/transfer"]
    );
    let transfer = &requests[2].body;
    assert_eq!(transfer["prior_responses"].as_array().map(Vec::len), Some(2));

    let session = orchestrator.session().expect("Session missing");
    assert_eq!(session.submissions().len(), 3);
    assert_eq!(session.feedback().len(), 3);
    let summary = SummaryView::from_session(session).expect("Summary should render");
    assert_eq!(summary.progress.completed_stages, 3);
    assert_eq!(summary.progress.percent, 100);
    assert_eq!(summary.strengths.len(), 1);
    assert_eq!(summary.strengths[0].stage, StageId::Recall);
    assert_eq!(summary.follow_ups[0].text, "Revisit this case in a week");
}

// ============================================================================
// Failures
// ============================================================================

/// One diagnosis at NARROW is rejected locally and never reaches the oracle.
#[tokio::test]
async fn test_narrow_with_one_diagnosis_is_rejected() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;
    complete_stages(&mut orchestrator, 1).await;

    let err = assert_err!(
        orchestrator
            .submit(StageInput::list(["Anterior STEMI", "", ""]))
            .await
    );

    assert!(matches!(
        err,
        WorkflowError::Validation {
            stage: StageId::Narrow,
            ..
        }
    ));
    assert_eq!(orchestrator.state().stage_index(), Some(1));
    assert_eq!(mock.request_count("narrow"), 0);
    assert_eq!(
        orchestrator.draft(),
        Some(&StageInput::list(["Anterior STEMI", "", ""]))
    );
}

/// HTTP 500 at ANALYZE keeps the stage and the draft; resubmitting succeeds.
#[tokio::test]
async fn test_server_error_then_retry() {
    let mock = MockOracle::new();
    mock.enqueue("analyze", Reply::Status(500));
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;
    complete_stages(&mut orchestrator, 2).await;

    let input = answer(StageId::Analyze);
    let err = assert_err!(orchestrator.submit(input.clone()).await);

    assert!(matches!(
        err,
        WorkflowError::OracleUnavailable {
            status: Some(500),
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(matches!(
        orchestrator.state(),
        WorkflowState::AwaitingInput { stage_index: 2, .. }
    ));
    assert_eq!(orchestrator.draft(), Some(&input));
    assert_eq!(
        orchestrator.error().map(|e| e.kind),
        Some(StageErrorKind::Unavailable)
    );
    let session = orchestrator.session().expect("Session missing");
    assert_eq!(session.feedback().len(), 2);
    assert_eq!(session.active_stage_index(), 2);

    let draft = orchestrator.draft().cloned().expect("Draft missing");
    let outcome = assert_ok!(orchestrator.submit(draft).await);
    assert!(matches!(outcome, Outcome::Advanced { stage_index: 3 }));
    assert_eq!(mock.request_count("analyze"), 2);
}

/// A token the oracle rejects surfaces as a re-login prompt.
#[tokio::test]
async fn test_rejected_token_requires_reauthentication() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let oracle: Arc<dyn FeedbackOracle> = Arc::new(HttpOracleGateway::new(
        &base_url,
        Arc::new(StaticToken::new("expired-token")),
        Duration::from_secs(5),
    ));
    let mut orchestrator = WorkflowOrchestrator::new(WorkflowKind::Snapps.catalog(), oracle);
    assert_ok!(orchestrator.dispatch(Action::Initialize(load_case())));

    let err = assert_err!(orchestrator.submit(answer(StageId::Summarize)).await);

    assert!(err.requires_reauthentication());
    let stage_error = orchestrator.error().expect("Stage error missing");
    assert!(stage_error.requires_reauthentication());
    assert!(orchestrator.draft().is_some());
    assert_eq!(orchestrator.state().stage_index(), Some(0));
}

/// A slow oracle past the orchestrator bound fails as unavailable.
#[tokio::test]
async fn test_slow_oracle_times_out() {
    let mock = MockOracle::new();
    mock.enqueue("summarize", Reply::Delayed(Duration::from_secs(2)));
    let base_url = mock.spawn().await;
    let mut orchestrator = WorkflowOrchestrator::new(WorkflowKind::Snapps.catalog(), gateway(&base_url))
        .with_timeout(Duration::from_millis(200));
    assert_ok!(orchestrator.dispatch(Action::Initialize(load_case())));

    let err = assert_err!(orchestrator.submit(answer(StageId::Summarize)).await);

    assert!(matches!(err, WorkflowError::OracleUnavailable { status: None, .. }));
    assert!(matches!(
        orchestrator.state(),
        WorkflowState::AwaitingInput { stage_index: 0, .. }
    ));
    assert!(orchestrator.session().expect("Session missing").feedback().is_empty());
}

/// A contract violation keeps the draft and does not advance.
#[tokio::test]
async fn test_contract_violation_keeps_draft() {
    let mock = MockOracle::new();
    mock.enqueue(
        "narrow",
        Reply::Json(serde_json::json!({ "feedback": "Missing the evaluation" })),
    );
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;
    complete_stages(&mut orchestrator, 1).await;

    let err = assert_err!(orchestrator.submit(answer(StageId::Narrow)).await);

    assert!(matches!(err, WorkflowError::OracleContract { .. }));
    assert_eq!(
        orchestrator.error().map(|e| e.kind),
        Some(StageErrorKind::Contract)
    );
    assert_eq!(orchestrator.draft(), Some(&answer(StageId::Narrow)));
    assert_eq!(orchestrator.state().stage_index(), Some(1));
}

// ============================================================================
// Concurrency
// ============================================================================

/// A response that arrives after a reset is discarded.
#[tokio::test]
async fn test_late_response_after_reset_is_discarded() {
    let mock = MockOracle::new();
    mock.enqueue("summarize", Reply::Delayed(Duration::from_millis(200)));
    let base_url = mock.spawn().await;
    let oracle = gateway(&base_url);
    let mut orchestrator =
        WorkflowOrchestrator::new(WorkflowKind::Snapps.catalog(), Arc::clone(&oracle));
    assert_ok!(orchestrator.dispatch(Action::Initialize(load_case())));

    let outcome = assert_ok!(orchestrator.dispatch(Action::Submit(answer(StageId::Summarize))));
    let Outcome::CallOracle(pending) = outcome else {
        panic!("Expected an oracle call");
    };

    let in_flight = {
        let pending = (*pending).clone();
        tokio::spawn(async move { oracle.submit(&pending.snapshot, &pending.submission).await })
    };

    // A second submit while one is in flight is rejected.
    let duplicate = orchestrator.dispatch(Action::Submit(answer(StageId::Summarize)));
    assert!(matches!(duplicate, Err(WorkflowError::InvalidTransition { .. })));

    assert_ok!(orchestrator.dispatch(Action::Reset));
    assert_ok!(orchestrator.dispatch(Action::Initialize(load_case())));

    let result = in_flight.await.expect("Oracle task panicked");
    assert!(result.is_ok(), "Late response should still be a success");

    let outcome = assert_ok!(orchestrator.dispatch(Action::Resolve {
        ticket: pending.ticket,
        result,
    }));
    assert!(matches!(outcome, Outcome::Discarded));

    let session = orchestrator.session().expect("Session missing");
    assert_ne!(session.id(), pending.snapshot.id());
    assert!(session.submissions().is_empty());
    assert!(session.feedback().is_empty());
    assert!(matches!(
        orchestrator.state(),
        WorkflowState::AwaitingInput { stage_index: 0, .. }
    ));
}

// ============================================================================
// Rewind
// ============================================================================

/// Rewinding keeps history; the resubmitted stage supersedes later entries.
#[tokio::test]
async fn test_rewind_and_resubmit() {
    let mock = MockOracle::new();
    let mut orchestrator = started(&mock, WorkflowKind::Snapps).await;
    complete_stages(&mut orchestrator, 3).await;

    let outcome = assert_ok!(orchestrator.dispatch(Action::Navigate(1)));
    assert!(matches!(outcome, Outcome::Rewound { stage_index: 1 }));
    assert_eq!(orchestrator.draft(), Some(&answer(StageId::Narrow)));

    let forward = orchestrator.dispatch(Action::Navigate(3));
    assert!(matches!(forward, Err(WorkflowError::InvalidTransition { .. })));

    let revised = StageInput::list(["Anterior STEMI", "Pericarditis"]);
    assert_ok!(orchestrator.submit(revised.clone()).await);

    let session = orchestrator.session().expect("Session missing");
    assert_eq!(session.submissions().len(), 4);
    assert_eq!(session.active_stage_index(), 2);

    let report = SessionReport::from_session(session);
    assert_eq!(report.transcript.superseded_count(), 2);
    let narrow = report
        .transcript
        .group(StageId::Narrow)
        .expect("NARROW group missing");
    assert_eq!(
        narrow.current().map(|e| &e.submission.raw_input),
        Some(&revised)
    );
    assert!(matches!(
        narrow.entries[0].feedback.as_ref().map(|f| &f.detail),
        Some(FeedbackDetail::Differential { .. })
    ));

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("(superseded)"));
}

// ============================================================================
// Fixtures
// ============================================================================

/// The config fixture loads and validates.
#[test]
fn test_config_fixture_loads() {
    let config = Config::load_from_file(&fixture("snapps.json")).expect("Failed to load config");

    assert_eq!(config.workflow, WorkflowKind::Snapps);
    assert_eq!(config.case_file, "case.json");
    assert_eq!(config.oracle.timeout(), Duration::from_secs(30));
    assert_ok!(config.validate());
}

/// The case fixture loads and renders.
#[test]
fn test_case_fixture_loads() {
    let case = load_case();

    assert_eq!(case.case_id, "cp-01");
    assert_eq!(case.patient.age, Some(58));
    let text = case.to_case_text();
    assert!(text.contains("ST elevation in V2-V4"));
    assert!(text.contains("158/94 mmHg"));
}
