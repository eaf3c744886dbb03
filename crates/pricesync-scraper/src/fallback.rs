//! Ordered recovery tiers consulted when the product API has no usable
//! price: the static listing page first, then the shared headless browser.

use std::time::Duration;

use pricesync_core::RetryPolicy;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::browser::BrowserSession;
use crate::error::ScrapeError;
use crate::page::PageFetcher;

/// Which tier produced a recovered price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTier {
    StaticPage,
    Browser,
}

impl FallbackTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackTier::StaticPage => "static_page",
            FallbackTier::Browser => "browser",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredPrice {
    pub price: Decimal,
    pub tier: FallbackTier,
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub scrape_enabled: bool,
    pub browser_enabled: bool,
    /// Listing pages live at `{base_url}/dp/{id}`.
    pub base_url: String,
    pub webdriver_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Ordered recovery tiers for identifiers the product API could not price.
///
/// Call [`ScrapeFallbackChain::open`] once before a run and
/// [`ScrapeFallbackChain::close`] once after it; the browser process, when
/// enabled, lives exactly that long.
#[derive(Debug)]
pub struct ScrapeFallbackChain {
    config: FallbackConfig,
    page: Option<PageFetcher>,
    browser: Mutex<Option<BrowserSession>>,
}

impl ScrapeFallbackChain {
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the tier-1 HTTP client cannot be
    /// constructed.
    pub fn new(config: FallbackConfig) -> Result<Self, ScrapeError> {
        let page = if config.scrape_enabled {
            Some(PageFetcher::new(&config.base_url, config.timeout, config.retry)?)
        } else {
            None
        };
        Ok(Self {
            config,
            page,
            browser: Mutex::new(None),
        })
    }

    /// A chain with every tier off; [`ScrapeFallbackChain::recover`] always
    /// returns `None`.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            config: FallbackConfig {
                scrape_enabled: false,
                browser_enabled: false,
                base_url: String::new(),
                webdriver_url: String::new(),
                timeout: Duration::from_secs(30),
                retry: RetryPolicy::none(),
            },
            page: None,
            browser: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.scrape_enabled || self.config.browser_enabled
    }

    /// Starts the shared browser process when tier 2 is enabled.
    ///
    /// A browser that fails to start leaves tier 2 unavailable for this run;
    /// tier 1 still operates.
    pub async fn open(&self) {
        if !self.config.browser_enabled {
            return;
        }
        let mut slot = self.browser.lock().await;
        if slot.is_some() {
            return;
        }
        let started = BrowserSession::start(
            &self.config.webdriver_url,
            self.config.timeout,
            self.config.retry,
        )
        .await;
        match started {
            Ok(session) => *slot = Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "browser fallback unavailable for this run");
            }
        }
    }

    /// Tries each enabled tier in order. `None` means every tier failed and
    /// the caller must leave the stored price alone.
    pub async fn recover(&self, external_id: &str) -> Option<RecoveredPrice> {
        if let Some(page) = &self.page {
            match page.scrape_price(external_id).await {
                Ok(found) => {
                    tracing::debug!(
                        identifier = %external_id,
                        matcher = found.matcher.as_str(),
                        price = %found.price,
                        "static page fallback recovered price"
                    );
                    return Some(RecoveredPrice {
                        price: found.price,
                        tier: FallbackTier::StaticPage,
                    });
                }
                Err(e) => {
                    tracing::info!(
                        identifier = %external_id,
                        error = %e,
                        "static page fallback failed"
                    );
                }
            }
        }

        let slot = self.browser.lock().await;
        let session = slot.as_ref()?;
        let url = format!("{}/dp/{external_id}", self.config.base_url.trim_end_matches('/'));
        match session.render_price(&url).await {
            Ok(price) => {
                tracing::debug!(
                    identifier = %external_id,
                    price = %price,
                    "browser fallback recovered price"
                );
                Some(RecoveredPrice {
                    price,
                    tier: FallbackTier::Browser,
                })
            }
            Err(e) => {
                tracing::info!(identifier = %external_id, error = %e, "browser fallback failed");
                None
            }
        }
    }

    /// Shuts the shared browser process down, if one was started.
    pub async fn close(&self) {
        let session = self.browser.lock().await.take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "failed to close browser session");
            }
        }
    }
}
