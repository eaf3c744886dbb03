use pricesync_aws::SigningError;
use pricesync_core::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaapiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by product API (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("product API server error {status}")]
    Server { status: u16 },

    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("invalid endpoint \"{endpoint}\": {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl Transient for PaapiError {
    fn is_transient(&self) -> bool {
        match self {
            PaapiError::RateLimited { .. } | PaapiError::Server { .. } => true,
            PaapiError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
