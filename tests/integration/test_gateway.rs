//! Integration tests for `HttpOracleGateway` error mapping and response
//! normalization over real HTTP.

mod mock_oracle;

use std::sync::Arc;
use std::time::Duration;

use mock_oracle::{canned_response, fixture, MockOracle, Reply, TEST_TOKEN};
use snapps_workflow::{
    CaseContext, EnvToken, FeedbackDetail, FeedbackOracle, FeedbackRecord, HttpOracleGateway,
    OracleError, Plausibility, SessionState, StageId, StageInput, StageSubmission, StaticToken,
    SubmissionId, TokenProvider, WorkflowKind,
};
use tokio_test::{assert_err, assert_ok};

fn gateway_with(
    base_url: &str,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
) -> HttpOracleGateway {
    HttpOracleGateway::new(base_url, tokens, timeout)
}

fn gateway(base_url: &str) -> HttpOracleGateway {
    gateway_with(
        base_url,
        Arc::new(StaticToken::new(TEST_TOKEN)),
        Duration::from_secs(5),
    )
}

fn new_session() -> SessionState {
    let case = CaseContext::load(fixture("case.json")).expect("Failed to load case fixture");
    SessionState::new(WorkflowKind::Snapps.catalog(), case)
}

/// A session positioned at NARROW, with SUMMARIZE already answered.
fn session_at_narrow() -> SessionState {
    let mut session = new_session();
    let submission = session
        .draft_submission(StageInput::text("58M with anterior STEMI pattern"))
        .expect("Failed to draft");
    let id = session.record_submission(submission).expect("Failed to record");
    session
        .record_feedback(FeedbackRecord::new(StageId::Summarize, id, "Good summary."))
        .expect("Failed to record feedback");
    session.advance();
    session
}

fn summary_submission(session: &SessionState) -> StageSubmission {
    session
        .draft_submission(StageInput::text("58M with chest pain"))
        .expect("Failed to draft")
}

// ============================================================================
// Success
// ============================================================================

/// Stage-specific lists fold into the canonical buckets.
#[tokio::test]
async fn test_summary_response_is_normalized() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);

    let record = assert_ok!(gateway(&base_url).submit(&session, &submission).await);

    assert_eq!(record.stage_id, StageId::Summarize);
    assert_eq!(record.for_submission, SubmissionId(0));
    assert_eq!(record.guidance, "Clear and focused summary.");
    assert_eq!(record.strengths, vec!["Included pertinent negatives"]);
    assert_eq!(record.gaps, vec!["State the time of onset", "Smoking history"]);
    assert!(record.follow_ups.is_empty());
}

/// The evaluated differential keeps every entry with its plausibility tag.
#[tokio::test]
async fn test_differential_response_is_normalized() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let session = session_at_narrow();
    let submission = session
        .draft_submission(StageInput::list(["Anterior STEMI", "Aortic dissection"]))
        .expect("Failed to draft");

    let record = assert_ok!(gateway(&base_url).submit(&session, &submission).await);

    let evaluated = record.evaluated_differential();
    assert_eq!(evaluated.len(), 2);
    assert_eq!(evaluated[0].plausibility, Plausibility::Likely);
    assert_eq!(evaluated[0].rationale.as_deref(), Some("ST elevation in V2-V4"));
    assert_eq!(evaluated[1].diagnosis, "Aortic dissection");
    assert_eq!(evaluated[1].plausibility, Plausibility::MustNotMiss);
    assert_eq!(record.gaps, vec!["Pulmonary embolism"]);
    assert!(matches!(record.detail, FeedbackDetail::Differential { .. }));
}

/// A root object wrapped in a single-element array is unwrapped.
#[tokio::test]
async fn test_array_wrapped_response_is_unwrapped() {
    let mock = MockOracle::new();
    mock.enqueue(
        "summarize",
        Reply::Json(serde_json::json!([canned_response("summarize")])),
    );
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);

    let record = assert_ok!(gateway(&base_url).submit(&session, &submission).await);

    assert_eq!(record.guidance, "Clear and focused summary.");
    assert_eq!(record.strengths.len(), 1);
}

/// A trailing slash on the base URL does not break the endpoint path.
#[tokio::test]
async fn test_trailing_slash_base_url() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);

    assert_ok!(
        gateway(&format!("{base_url}/"))
            .submit(&session, &submission)
            .await
    );
    assert_eq!(mock.request_count("summarize"), 1);
}

// ============================================================================
// Authentication
// ============================================================================

/// A rejected token maps to `Authentication`.
#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway_with(
        &base_url,
        Arc::new(StaticToken::new("wrong-token")),
        Duration::from_secs(5),
    );

    let err = assert_err!(gateway.submit(&session, &submission).await);

    assert!(matches!(err, OracleError::Authentication { .. }));
}

/// A missing token fails before any request is sent.
#[tokio::test]
async fn test_missing_token_never_reaches_the_oracle() {
    let mock = MockOracle::new();
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway_with(
        &base_url,
        Arc::new(EnvToken::new("SNAPPS_INTEGRATION_TOKEN_THAT_IS_NEVER_SET")),
        Duration::from_secs(5),
    );

    let err = assert_err!(gateway.submit(&session, &submission).await);

    assert!(matches!(err, OracleError::Authentication { .. }));
    assert!(mock.requests().is_empty());
}

// ============================================================================
// Unavailable
// ============================================================================

/// Non-2xx statuses other than 401/403 map to `Unavailable` with the status.
#[tokio::test]
async fn test_error_statuses_map_to_unavailable() {
    let mock = MockOracle::new();
    mock.enqueue("summarize", Reply::Status(500));
    mock.enqueue("summarize", Reply::Status(503));
    mock.enqueue("summarize", Reply::Status(403));
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway(&base_url);

    for expected in [500, 503] {
        let err = assert_err!(gateway.submit(&session, &submission).await);
        assert!(
            matches!(err, OracleError::Unavailable { status: Some(s), .. } if s == expected),
            "expected status {expected}, got {err:?}"
        );
    }

    let err = assert_err!(gateway.submit(&session, &submission).await);
    assert!(matches!(err, OracleError::Authentication { .. }));
}

/// A response slower than the gateway timeout maps to `Unavailable`.
#[tokio::test]
async fn test_gateway_timeout_maps_to_unavailable() {
    let mock = MockOracle::new();
    mock.enqueue("summarize", Reply::Delayed(Duration::from_secs(2)));
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway_with(
        &base_url,
        Arc::new(StaticToken::new(TEST_TOKEN)),
        Duration::from_millis(200),
    );

    let err = assert_err!(gateway.submit(&session, &submission).await);

    assert!(matches!(err, OracleError::Unavailable { status: None, .. }));
}

/// Nothing listening maps to `Unavailable`.
#[tokio::test]
async fn test_connection_refused_maps_to_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("Failed to get local addr").port();
    drop(listener);

    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway(&format!("http://127.0.0.1:{port}/api"));

    let err = assert_err!(gateway.submit(&session, &submission).await);

    assert!(matches!(err, OracleError::Unavailable { status: None, .. }));
}

// ============================================================================
// Contract
// ============================================================================

/// NARROW feedback without an evaluated differential violates the contract.
#[tokio::test]
async fn test_missing_required_field_is_contract_error() {
    let mock = MockOracle::new();
    mock.enqueue(
        "narrow",
        Reply::Json(serde_json::json!({ "feedback": "Looks fine." })),
    );
    let base_url = mock.spawn().await;
    let session = session_at_narrow();
    let submission = session
        .draft_submission(StageInput::list(["Anterior STEMI", "Aortic dissection"]))
        .expect("Failed to draft");

    let err = assert_err!(gateway(&base_url).submit(&session, &submission).await);

    assert!(matches!(
        err,
        OracleError::Contract {
            stage: StageId::Narrow,
            ..
        }
    ));
}

/// Multi-element arrays and non-JSON bodies violate the contract.
#[tokio::test]
async fn test_malformed_bodies_are_contract_errors() {
    let mock = MockOracle::new();
    mock.enqueue(
        "summarize",
        Reply::Json(serde_json::json!([
            canned_response("summarize"),
            canned_response("summarize")
        ])),
    );
    mock.enqueue("summarize", Reply::Text("<html>Bad gateway</html>"));
    mock.enqueue("summarize", Reply::Json(serde_json::json!("just a string")));
    let base_url = mock.spawn().await;
    let session = new_session();
    let submission = summary_submission(&session);
    let gateway = gateway(&base_url);

    for _ in 0..3 {
        let err = assert_err!(gateway.submit(&session, &submission).await);
        assert!(matches!(err, OracleError::Contract { .. }), "got {err:?}");
    }
}
