//! Remote service errors

use thiserror::Error;

/// Failure talking to the remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server refused the turn or consume because the balance is zero
    #[error("credits exhausted")]
    CreditsExhausted,

    /// Endpoint requires a pro tier
    #[error("pro subscription required")]
    ProRequired,

    /// Missing or rejected auth token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Session (or other resource) does not exist for this user
    #[error("not found: {0}")]
    NotFound(String),

    /// Server rejected the request payload
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether this is the server's credit denial
    #[must_use]
    pub fn is_credit_denial(&self) -> bool {
        matches!(self, Self::CreditsExhausted)
    }

    /// Whether retrying the same request later could succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
