//! Tier-1 recovery: plain HTTP fetch of the public listing page.

use std::time::Duration;

use pricesync_core::RetryPolicy;
use reqwest::Client;

use crate::error::ScrapeError;
use crate::parse::{extract_price, PriceMatch};

/// Desktop browser identities rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Case-insensitive markers of an anti-bot interstitial instead of a page.
const BOT_MARKERS: &[&str] = &[
    "enter the characters you see below",
    "/errors/validatecaptcha",
    "<title>robot check</title>",
    "api-services-support@amazon.com",
    "attention required! | cloudflare",
    "/cdn-cgi/challenge-platform/",
];

/// Picks one of the rotated identities at random.
pub(crate) fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::random_range(0..USER_AGENTS.len())]
}

/// Returns the first bot-challenge marker found in `body`, if any.
pub(crate) fn bot_marker(body: &str) -> Option<&'static str> {
    let lowered = body.to_ascii_lowercase();
    BOT_MARKERS.iter().copied().find(|m| lowered.contains(m))
}

/// Fetches listing pages from `{base_url}/dp/{id}` and extracts a price.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl PageFetcher {
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Public page URL for `external_id`.
    #[must_use]
    pub fn listing_url(&self, external_id: &str) -> String {
        format!("{}/dp/{external_id}", self.base_url)
    }

    /// Fetches the page for `external_id` and runs the price matchers.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Blocked`] for HTTP 503 or a bot-challenge page.
    /// - [`ScrapeError::NoPrice`] when no matcher finds a positive price.
    /// - [`ScrapeError::RateLimited`] / [`ScrapeError::Http`] after retries.
    /// - [`ScrapeError::UnexpectedStatus`] for other non-2xx statuses.
    pub async fn scrape_price(&self, external_id: &str) -> Result<PriceMatch, ScrapeError> {
        let url = self.listing_url(external_id);
        let html = self
            .retry
            .run("scrape.page", || self.fetch_once(&url))
            .await?;
        extract_price(&html).ok_or(ScrapeError::NoPrice { url })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ScrapeError::RateLimited {
                url: url.to_owned(),
            });
        }
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ScrapeError::Blocked {
                url: url.to_owned(),
                marker: "HTTP 503".to_string(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await?;
        if let Some(marker) = bot_marker(&body) {
            return Err(ScrapeError::Blocked {
                url: url.to_owned(),
                marker: marker.to_string(),
            });
        }
        Ok(body)
    }
}
