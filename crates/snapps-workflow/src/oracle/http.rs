//! HTTP implementation of the feedback oracle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::request::OracleRequest;
use super::response::normalize_response;
use super::token::TokenProvider;
use super::{FeedbackOracle, OracleError, OracleResult};
use crate::config::OracleConfig;
use crate::session::{SessionState, StageSubmission};

/// Upper bound on how much of an error body is kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Bearer-authenticated JSON client for the feedback oracle.
///
/// Posts each submission to `{base_url}/{workflow}/{stage}`.
#[derive(Clone)]
pub struct HttpOracleGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpOracleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOracleGateway")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpOracleGateway {
    /// Creates a gateway for `base_url` with a per-request timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            timeout,
        }
    }

    /// Creates a gateway from the `oracle` section of the configuration.
    #[must_use]
    pub fn from_config(config: &OracleConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::new(&config.base_url, tokens, config.timeout())
    }

    /// Returns the base URL (without trailing slash).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, request: &OracleRequest) -> String {
        format!("{}/{}", self.base_url, request.path())
    }
}

fn truncate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl FeedbackOracle for HttpOracleGateway {
    async fn submit(&self, session: &SessionState, submission: &StageSubmission) -> OracleResult {
        let stage = submission.stage_id;
        let token = self.tokens.token().await?;
        let request = OracleRequest::build(session, submission);
        let url = self.endpoint(&request);
        let started = Instant::now();

        debug!(%stage, session_id = %session.id(), url = %url, "Sending oracle request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let elapsed_ms = started.elapsed().as_millis();
                if e.is_timeout() {
                    warn!(%stage, elapsed_ms, "Oracle request timed out");
                    OracleError::unavailable(
                        stage,
                        None,
                        format!("no response within {}s", self.timeout.as_secs()),
                    )
                } else {
                    warn!(%stage, elapsed_ms, error = %e, "Oracle unreachable");
                    OracleError::unavailable(stage, None, format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis();
        debug!(%stage, status = status.as_u16(), elapsed_ms, "Oracle responded");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(%stage, status = status.as_u16(), "Oracle rejected credentials");
            return Err(OracleError::authentication(format!(
                "oracle returned {status}"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%stage, status = status.as_u16(), elapsed_ms, "Oracle returned an error status");
            return Err(OracleError::unavailable(
                stage,
                Some(status.as_u16()),
                format!("oracle returned {status}: {}", truncate(&body)),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            OracleError::unavailable(stage, Some(status.as_u16()), format!("failed to read body: {e}"))
        })?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| OracleError::contract(stage, format!("response is not JSON: {e}")))?;

        normalize_response(stage, submission.id, body)
    }
}
