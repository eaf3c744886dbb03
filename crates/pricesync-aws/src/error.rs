use pricesync_core::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("credentials are empty")]
    MissingCredentials,

    #[error("request has no host header")]
    MissingHost,

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Errors returned by [`crate::QueueClient`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("queue API throttled the request")]
    Throttled,

    #[error("queue API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to deserialize queue response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("invalid queue endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Transient for QueueError {
    fn is_transient(&self) -> bool {
        match self {
            QueueError::Throttled => true,
            QueueError::Http(e) => e.is_timeout() || e.is_connect(),
            QueueError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
