use pricesync_core::Transient;
use thiserror::Error;

/// Tier-1 page fetch and parse failures.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited fetching {url}")]
    RateLimited { url: String },

    #[error("bot challenge served for {url}: {marker}")]
    Blocked { url: String, marker: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("no price found in page {url}")]
    NoPrice { url: String },
}

impl Transient for ScrapeError {
    fn is_transient(&self) -> bool {
        match self {
            ScrapeError::RateLimited { .. } => true,
            ScrapeError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Tier-2 WebDriver failures.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("HTTP error talking to WebDriver: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver {command} failed: {error}: {message}")]
    Command {
        command: String,
        error: String,
        message: String,
    },

    #[error("unexpected WebDriver response for {command}: {reason}")]
    Protocol { command: String, reason: String },

    #[error("no price element matched on {url}")]
    NoPriceElement { url: String },

    #[error("price text \"{text}\" is not a positive amount")]
    UnparseablePrice { text: String },
}

impl Transient for BrowserError {
    fn is_transient(&self) -> bool {
        match self {
            BrowserError::Http(e) => e.is_timeout() || e.is_connect(),
            BrowserError::Command { error, .. } => error == "timeout",
            _ => false,
        }
    }
}
