//! In-process feedback oracle for end-to-end tests.
//!
//! Serves `POST /api/{workflow}/{stage}` on an ephemeral port. Each stage
//! answers with a canned success unless a reply has been queued for it.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Bearer token the mock accepts.
pub const TEST_TOKEN: &str = "test-token";

/// How the mock answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The canned success body for the stage.
    Success,
    /// A specific JSON body with status 200.
    Json(Value),
    /// An empty error response with this status.
    Status(u16),
    /// The canned success body, after a delay.
    Delayed(Duration),
    /// A non-JSON body with status 200.
    Text(&'static str),
}

/// One request as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub workflow: String,
    pub stage: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct MockOracle {
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for the next request to `stage`.
    pub fn enqueue(&self, stage: &str, reply: Reply) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .entry(stage.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    pub fn request_count(&self, stage: &str) -> usize {
        self.requests().iter().filter(|r| r.stage == stage).count()
    }

    /// Starts serving and returns the base URL (`http://127.0.0.1:{port}/api`).
    pub async fn spawn(&self) -> String {
        let router = Router::new()
            .route("/api/:workflow/:stage", post(handle))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        format!("http://{addr}/api")
    }

    fn next_reply(&self, stage: &str) -> Reply {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .get_mut(stage)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Success)
    }
}

async fn handle(
    State(mock): State<MockOracle>,
    Path((workflow, stage)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    mock.requests
        .lock()
        .expect("requests lock poisoned")
        .push(RecordedRequest {
            workflow,
            stage: stage.clone(),
            authorization: authorization.clone(),
            body,
        });

    let expected = format!("Bearer {TEST_TOKEN}");
    if authorization.as_deref() != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }

    match mock.next_reply(&stage) {
        Reply::Success => Json(canned_response(&stage)).into_response(),
        Reply::Json(value) => Json(value).into_response(),
        Reply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "oracle failure").into_response()
        }
        Reply::Delayed(delay) => {
            tokio::time::sleep(delay).await;
            Json(canned_response(&stage)).into_response()
        }
        Reply::Text(text) => (StatusCode::OK, text).into_response(),
    }
}

/// A valid response body for `stage`, in that stage's own schema.
pub fn canned_response(stage: &str) -> Value {
    match stage {
        "summarize" => json!({
            "feedback": "Clear and focused summary.",
            "strengths": ["Included pertinent negatives"],
            "improvements": ["State the time of onset"],
            "missing_elements": ["Smoking history"]
        }),
        "narrow" => json!({
            "feedback": "Reasonable differential.",
            "evaluated_differential": [
                { "diagnosis": "Anterior STEMI", "plausibility": "high", "rationale": "ST elevation in V2-V4" },
                { "name": "Aortic dissection", "plausibility": "Must-Not-Miss" }
            ],
            "missing_diagnoses": ["Pulmonary embolism"]
        }),
        "analyze" => json!({
            "feedback": "Good use of discriminating findings.",
            "strengths": ["Compared the ECG against each diagnosis"],
            "key_discriminators": ["Equal radial pulses", "Territorial ST elevation"]
        }),
        "probe" => json!({
            "feedback": "Good question.",
            "answers": [
                { "question": "Should I get a CT angiogram before the cath lab?", "answer": "Only if dissection remains likely." }
            ],
            "follow_up_questions": ["What would make you reconsider dissection?"]
        }),
        "plan" => json!({
            "feedback": "Appropriate plan.",
            "next_steps": ["Door-to-balloon under 90 minutes"]
        }),
        "select" => json!({
            "feedback": "Useful learning issue.",
            "resources": ["ACC/AHA STEMI guideline"],
            "learning_objectives": ["Recognize dissection mimics"]
        }),
        _ => json!({
            "feedback": format!("Feedback for {stage}."),
            "strengths": ["Thoughtful answer"],
            "recommended_follow_ups": ["Revisit this case in a week"]
        }),
    }
}

/// Path to a file under `tests/integration/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}
