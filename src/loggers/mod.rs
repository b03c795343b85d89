//! Token usage loggers.

use crate::token::CommonAccessToken;
use crate::utils::current_timestamp;
use tracing::info;

/// Receives every successfully validated token. Fire-and-forget: a logger
/// never affects the validation outcome.
#[async_trait::async_trait]
pub trait TokenLogger: Send + Sync {
    /// Log one token use
    async fn log_token(&self, token: &CommonAccessToken);
}

/// Logs token usage through `tracing` at info level
#[derive(Debug, Default, Clone)]
pub struct TracingTokenLogger;

impl TracingTokenLogger {
    /// Create a logger
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl TokenLogger for TracingTokenLogger {
    async fn log_token(&self, token: &CommonAccessToken) {
        let claims = token.claims();
        info!(
            cti = token.cti().as_deref().unwrap_or(""),
            timestamp = current_timestamp(),
            iat = claims.issued_at(),
            exp = claims.expiration(),
            sub = claims.subject(),
            "token used"
        );
    }
}
