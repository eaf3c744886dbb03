//! Listing-level domain types shared by the fetchers, the ledger and the
//! orchestrator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One purchasable marketplace entry as stored in the catalog.
///
/// The catalog owns this row. A sync cycle only ever rewrites `price`,
/// `merchant`, the rating fields and `last_synced_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    /// Stable key at the marketplace (an ASIN for the product API).
    pub external_id: String,
    /// `0` means "no usable price"; see [`Listing::has_usable_price`].
    pub price: Decimal,
    pub merchant: Option<String>,
    pub affiliate_url: Option<String>,
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Returns `true` when the stored price is a real price rather than the
    /// zero sentinel.
    #[must_use]
    pub fn has_usable_price(&self) -> bool {
        self.price > Decimal::ZERO
    }
}

/// An immutable, timestamped price sample for one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub listing_id: i64,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Per-identifier result of a batch fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    /// A trusted merchant offers the item at a positive price.
    Ok,
    /// The source answered but no listing carries a positive price.
    OutOfStock,
    /// The winning merchant is on the exclusion list; price forced to `0`.
    Excluded,
    /// The source does not know the identifier.
    NotFound,
    /// Transport or parse failure; nothing may be inferred about the price.
    Error,
}

impl FetchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::OutOfStock => "out_of_stock",
            FetchStatus::Excluded => "excluded",
            FetchStatus::NotFound => "not_found",
            FetchStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical record every source shape is resolved into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPrice {
    pub external_id: String,
    pub status: FetchStatus,
    /// Positive only when `status` is [`FetchStatus::Ok`].
    pub price: Decimal,
    pub merchant: Option<String>,
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub detail_url: Option<String>,
}

impl FetchedPrice {
    /// A record carrying only a status and the zero price.
    #[must_use]
    pub fn without_price(external_id: &str, status: FetchStatus) -> Self {
        Self {
            external_id: external_id.to_owned(),
            status,
            price: Decimal::ZERO,
            merchant: None,
            rating: None,
            rating_count: None,
            detail_url: None,
        }
    }

    #[must_use]
    pub fn error(external_id: &str) -> Self {
        Self::without_price(external_id, FetchStatus::Error)
    }

    /// Returns `true` when this record may feed the history ledger.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status == FetchStatus::Ok && self.price > Decimal::ZERO
    }
}

/// Why a listing is being synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncReason {
    /// Picked up by the periodic stale scan.
    Scan,
    /// Requested through the work queue.
    Queue,
    /// Named explicitly on the command line.
    Manual,
}

impl SyncReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncReason::Scan => "scan",
            SyncReason::Queue => "queue",
            SyncReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for SyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One identifier to refresh. Consumed exactly once, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub external_id: String,
    pub reason: SyncReason,
}

impl SyncJob {
    #[must_use]
    pub fn new(external_id: impl Into<String>, reason: SyncReason) -> Self {
        Self {
            external_id: external_id.into(),
            reason,
        }
    }
}
