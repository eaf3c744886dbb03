//! Ordered price matchers over listing-page HTML.
//!
//! Matchers run strongest-signal first and the first positive price wins:
//! schema.org JSON-LD offers, then an embedded page-state JSON blob, then a
//! loose `"price": <number>` pattern anywhere in the document.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

static JSONLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static A_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']a-state["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static WINDOW_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>\s*window\.__(?:INITIAL|PRELOADED)_STATE__\s*=\s*(.*?)</script>")
        .expect("valid regex")
});

static LOOSE_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""price"\s*:\s*"?\$?([0-9]+(?:\.[0-9]{1,2})?)"?"#).expect("valid regex")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("valid regex"));

static DECIMAL_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9.]*[0-9],[0-9]{2}$").expect("valid regex"));

/// Which matcher produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMatcher {
    StructuredData,
    StateBlob,
    LoosePattern,
}

impl PriceMatcher {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PriceMatcher::StructuredData => "structured_data",
            PriceMatcher::StateBlob => "state_blob",
            PriceMatcher::LoosePattern => "loose_pattern",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceMatch {
    pub price: Decimal,
    pub matcher: PriceMatcher,
}

/// Runs the matchers in order and returns the first positive price.
#[must_use]
pub fn extract_price(html: &str) -> Option<PriceMatch> {
    let ordered: [(PriceMatcher, fn(&str) -> Option<Decimal>); 3] = [
        (PriceMatcher::StructuredData, jsonld_price),
        (PriceMatcher::StateBlob, state_blob_price),
        (PriceMatcher::LoosePattern, loose_price),
    ];
    ordered
        .into_iter()
        .find_map(|(matcher, run)| run(html).map(|price| PriceMatch { price, matcher }))
}

/// Parses human-readable price text such as `"$1,299.99"` or `"12,50 €"`.
///
/// Returns `None` unless the result is strictly positive.
#[must_use]
pub fn parse_price_text(text: &str) -> Option<Decimal> {
    let compact: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let normalized = if let (Some(dot), Some(comma)) = (compact.rfind('.'), compact.rfind(',')) {
        // Whichever separator comes last is the decimal point.
        if comma > dot {
            compact.replace('.', "").replace(',', ".")
        } else {
            compact.replace(',', "")
        }
    } else if DECIMAL_COMMA_RE.is_match(&compact) {
        compact.replace('.', "").replace(',', ".")
    } else {
        compact.replace(',', "")
    };
    let token = NUMBER_RE.find(&normalized)?.as_str();
    Decimal::from_str(token)
        .ok()
        .map(|d| d.round_dp(2))
        .filter(|d| *d > Decimal::ZERO)
}

fn jsonld_price(html: &str) -> Option<Decimal> {
    JSONLD_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
        .find_map(|value| offers_price(&value))
}

/// Depth-first search for an `offers` node carrying `price` or `lowPrice`.
fn offers_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Array(items) => items.iter().find_map(offers_price),
        Value::Object(map) => {
            if let Some(offers) = map.get("offers") {
                let from_offers = match offers {
                    Value::Array(list) => list.iter().find_map(offer_node_price),
                    other => offer_node_price(other),
                };
                if from_offers.is_some() {
                    return from_offers;
                }
            }
            map.get("@graph")
                .and_then(offers_price)
                .or_else(|| map.values().find_map(offers_price))
        }
        _ => None,
    }
}

fn offer_node_price(offer: &Value) -> Option<Decimal> {
    ["price", "lowPrice"]
        .iter()
        .find_map(|key| offer.get(*key).and_then(numeric_value))
}

fn numeric_value(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    };
    parsed
        .map(|d| d.round_dp(2))
        .filter(|d| *d > Decimal::ZERO)
}

fn state_blob_price(html: &str) -> Option<Decimal> {
    let blobs = A_STATE_RE
        .captures_iter(html)
        .chain(WINDOW_STATE_RE.captures_iter(html))
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| {
            let raw = m.as_str().trim().trim_end_matches(';').trim();
            serde_json::from_str::<Value>(raw).ok()
        });

    for blob in blobs {
        for key in ["priceAmount", "price", "displayPrice"] {
            if let Some(price) = find_key(&blob, key) {
                return Some(price);
            }
        }
    }
    None
}

fn find_key(value: &Value, key: &str) -> Option<Decimal> {
    match value {
        Value::Object(map) => map
            .get(key)
            .and_then(numeric_value)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

fn loose_price(html: &str) -> Option<Decimal> {
    LOOSE_PRICE_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| Decimal::from_str(m.as_str()).ok())
        .find(|d| *d > Decimal::ZERO)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
