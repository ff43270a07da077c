//! Provider-local errors.

use thiserror::Error;

/// Failure of a single provider call. Orchestrators convert every variant
/// to absence; none of these reach orchestrator callers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("credential {0} is not configured")]
    MissingCredential(&'static str),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("request timed out")]
    Timeout,
}

impl ProviderError {
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }
}

/// Result of a provider call: a value, nothing found, or an error.
pub type ProviderResult<T> = Result<Option<T>, ProviderError>;
