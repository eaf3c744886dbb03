//! Fallback price recovery for listings the product API could not price.
//!
//! Tier 1 fetches the public listing page over plain HTTP and runs an
//! ordered set of price matchers over the HTML. Tier 2 renders the page in
//! a headless browser driven over the WebDriver protocol and reads the
//! price element. [`ScrapeFallbackChain`] runs them in that order.

pub mod browser;
pub mod error;
pub mod fallback;
pub mod page;
pub mod parse;

pub use browser::{BrowserSession, PRICE_SELECTORS};
pub use error::{BrowserError, ScrapeError};
pub use fallback::{FallbackConfig, FallbackTier, RecoveredPrice, ScrapeFallbackChain};
pub use page::PageFetcher;
pub use parse::{extract_price, parse_price_text, PriceMatch, PriceMatcher};
