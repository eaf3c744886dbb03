//! Seams between the orchestrator and the systems it drives.
//!
//! Production implementations live in [`crate::adapters`]; tests substitute
//! in-memory fakes.

use std::future::Future;

use chrono::{DateTime, Utc};
use pricesync_aws::{QueueError, QueueMessage};
use pricesync_core::{DayPolicy, FetchedPrice, Listing, PriceObservation};
use pricesync_db::{DbError, ListingCommit};
use pricesync_scraper::RecoveredPrice;

/// Primary price source: the signed batch product API.
pub trait PriceSource: Send + Sync {
    /// Resolves every identifier to exactly one record, in input order.
    /// Transport failures surface as per-identifier error records.
    fn fetch_batch(&self, ids: &[String]) -> impl Future<Output = Vec<FetchedPrice>> + Send;

    /// Identifiers per orchestrator batch.
    fn batch_size(&self) -> usize;
}

/// Recovery tiers consulted when the primary source has no usable price.
pub trait FallbackSource: Send + Sync {
    /// Acquires run-scoped resources (the shared browser).
    fn open(&self) -> impl Future<Output = ()> + Send;

    /// `None` when every tier failed.
    fn recover(&self, external_id: &str) -> impl Future<Output = Option<RecoveredPrice>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Catalog rows and the append-only price history.
pub trait CatalogStore: Send + Sync {
    fn listings_by_external_ids(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Listing>, DbError>> + Send;

    fn stale_listings(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Listing>, DbError>> + Send;

    /// Appends unless the same price was already observed on that calendar
    /// day. Returns `true` if a row was written.
    fn append_observation(
        &self,
        observation: &PriceObservation,
        days: DayPolicy,
    ) -> impl Future<Output = Result<bool, DbError>> + Send;

    /// Observations at or after `since`, newest first.
    fn history_since(
        &self,
        listing_id: i64,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<PriceObservation>, DbError>> + Send;

    fn commit_listing(
        &self,
        listing_id: i64,
        commit: &ListingCommit<'_>,
    ) -> impl Future<Output = Result<(), DbError>> + Send;
}

/// Source of single-listing refresh requests.
pub trait WorkQueue: Send + Sync {
    fn receive(&self) -> impl Future<Output = Result<Vec<QueueMessage>, QueueError>> + Send;

    fn acknowledge(&self, receipt_handle: &str)
        -> impl Future<Output = Result<(), QueueError>> + Send;
}
