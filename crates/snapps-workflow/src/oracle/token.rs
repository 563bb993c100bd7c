//! Bearer credential providers.

use async_trait::async_trait;

use super::OracleError;

/// Supplies a bearer token on demand.
///
/// Called once per oracle round trip, so implementations may refresh.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the current bearer token.
    async fn token(&self) -> Result<String, OracleError>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, OracleError> {
        if self.0.trim().is_empty() {
            return Err(OracleError::authentication("no bearer token configured"));
        }
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    /// Reads from `var`.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Returns the variable name.
    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }
}

#[async_trait]
impl TokenProvider for EnvToken {
    async fn token(&self) -> Result<String, OracleError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(OracleError::authentication(format!(
                "environment variable {} is not set",
                self.var
            ))),
        }
    }
}
