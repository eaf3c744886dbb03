//! Tier-2 recovery: a headless browser driven over the W3C WebDriver
//! protocol.
//!
//! One [`BrowserSession`] (one browser process) serves a whole run. Each
//! identifier gets its own tab, opened and closed around the render, and a
//! mutex keeps at most one tab open at a time since drivers do not reliably
//! support concurrent window switching within one session.

use std::time::Duration;

use pricesync_core::RetryPolicy;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::BrowserError;
use crate::parse::parse_price_text;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Price element selectors, tried in order.
pub const PRICE_SELECTORS: &[&str] = &[
    "#corePrice_feature_div .a-offscreen",
    "#corePriceDisplay_desktop_feature_div .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    ".a-price .a-offscreen",
];

/// An open WebDriver session.
#[derive(Debug)]
pub struct BrowserSession {
    http: Client,
    base_url: String,
    session_id: String,
    main_window: String,
    retry: RetryPolicy,
    tab_lock: Mutex<()>,
}

impl BrowserSession {
    /// Launches a headless browser through the driver at `webdriver_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError`] if the driver is unreachable or refuses to
    /// create a session.
    pub async fn start(
        webdriver_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, BrowserError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let base_url = webdriver_url.trim_end_matches('/').to_string();

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--no-sandbox",
                            "--window-size=1366,900"
                        ]
                    }
                }
            }
        });
        let value = send(
            &http,
            Method::POST,
            &format!("{base_url}/session"),
            Some(&capabilities),
            "new session",
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                command: "new session".to_string(),
                reason: "missing sessionId".to_string(),
            })?
            .to_string();

        let mut session = Self {
            http,
            base_url,
            session_id,
            main_window: String::new(),
            retry,
            tab_lock: Mutex::new(()),
        };
        let handle = session.command(Method::GET, "window", None, "get window handle").await?;
        session.main_window = as_string(&handle, "get window handle")?;

        tracing::info!(session_id = %session.session_id, "browser session started");
        Ok(session)
    }

    /// Renders `url` in a fresh tab and reads the first matching price
    /// element.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::NoPriceElement`] when no selector matches,
    /// [`BrowserError::UnparseablePrice`] for non-positive text, or a
    /// transport/protocol error from the driver.
    pub async fn render_price(&self, url: &str) -> Result<Decimal, BrowserError> {
        self.retry
            .run("browser.render", || self.render_in_tab(url))
            .await
    }

    /// Ends the session, shutting the browser process down.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError`] if the driver rejects the delete.
    pub async fn close(self) -> Result<(), BrowserError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        send(&self.http, Method::DELETE, &url, None, "delete session").await?;
        tracing::info!(session_id = %self.session_id, "browser session closed");
        Ok(())
    }

    async fn render_in_tab(&self, url: &str) -> Result<Decimal, BrowserError> {
        let _guard = self.tab_lock.lock().await;

        let created = self
            .command(Method::POST, "window/new", Some(&json!({ "type": "tab" })), "new window")
            .await?;
        let tab = created
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                command: "new window".to_string(),
                reason: "missing handle".to_string(),
            })?
            .to_string();
        self.switch_to(&tab).await?;

        let outcome = self.read_price(url).await;

        // Always close the tab and return to the main window, even when the
        // render failed, so the next identifier starts clean.
        let closed = self.command(Method::DELETE, "window", None, "close window").await;
        let restored = self.switch_to(&self.main_window).await;
        if let Err(e) = closed.and(restored) {
            tracing::warn!(error = %e, "failed to clean up browser tab");
        }

        outcome
    }

    async fn read_price(&self, url: &str) -> Result<Decimal, BrowserError> {
        self.command(Method::POST, "url", Some(&json!({ "url": url })), "navigate")
            .await?;

        for selector in PRICE_SELECTORS {
            let found = self
                .command(
                    Method::POST,
                    "element",
                    Some(&json!({ "using": "css selector", "value": selector })),
                    "find element",
                )
                .await;
            let element = match found {
                Ok(v) => v,
                Err(BrowserError::Command { ref error, .. }) if error == "no such element" => {
                    continue
                }
                Err(e) => return Err(e),
            };
            let Some(element_id) = element.get(ELEMENT_KEY).and_then(Value::as_str) else {
                continue;
            };

            // Offscreen price spans have no rendered text, so read the DOM
            // property instead of the visible text.
            let text = self
                .command(
                    Method::GET,
                    &format!("element/{element_id}/property/textContent"),
                    None,
                    "element text",
                )
                .await?;
            let text = text.as_str().unwrap_or_default();
            return parse_price_text(text).ok_or_else(|| BrowserError::UnparseablePrice {
                text: text.to_string(),
            });
        }

        Err(BrowserError::NoPriceElement {
            url: url.to_string(),
        })
    }

    async fn switch_to(&self, handle: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "window", Some(&json!({ "handle": handle })), "switch window")
            .await
            .map(|_| ())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        name: &str,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}/session/{}/{path}", self.base_url, self.session_id);
        send(&self.http, method, &url, body, name).await
    }
}

/// Sends one WebDriver command and unwraps its `value` member.
async fn send(
    http: &Client,
    method: Method,
    url: &str,
    body: Option<&Value>,
    name: &str,
) -> Result<Value, BrowserError> {
    let mut request = http.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(body);
    } else if method == Method::POST {
        request = request.json(&json!({}));
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    let parsed: Value = serde_json::from_str(&text).map_err(|e| BrowserError::Protocol {
        command: name.to_string(),
        reason: format!("invalid JSON ({e})"),
    })?;

    let value = parsed.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(BrowserError::Command {
            command: name.to_string(),
            error,
            message,
        });
    }
    Ok(value)
}

fn as_string(value: &Value, name: &str) -> Result<String, BrowserError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Protocol {
            command: name.to_string(),
            reason: format!("expected a string, got {value}"),
        })
}
