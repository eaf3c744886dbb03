//! The per-run sync loop.
//!
//! Each listing moves through
//! `Idle → FetchBatch → (ReconcileAnomaly)? → PersistHistory → ComputeTrend →
//! Commit → Idle`.
//! Batches run strictly one after another with a fixed delay between them,
//! which is the primary rate limit against the product API. Per-listing
//! failures become [`ListingOutcome`]s; only catalog store failures abort
//! the run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pricesync_core::{
    AppConfig, Clock, DayPolicy, FetchStatus, FetchedPrice, HistoryWindow, Listing,
    PriceObservation, SystemClock, TrendEngine, TrendPolicy, TrendSnapshot,
};
use pricesync_db::ListingCommit;
use pricesync_scraper::RecoveredPrice;
use rust_decimal::Decimal;

use crate::error::SyncError;
use crate::outcome::{AnomalyResolution, ListingOutcome, PriceOrigin, RunSummary, SoftFailure};
use crate::ports::{CatalogStore, FallbackSource, PriceSource};

/// Policy knobs for one orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub inter_batch_delay: Duration,
    /// A fetched price further than this many percent from the stored price
    /// triggers a recheck.
    pub anomaly_threshold_pct: Decimal,
    pub anomaly_recheck_delay: Duration,
    /// Listings not synced for this long are picked up by a scan.
    pub stale_after: chrono::Duration,
    pub scan_limit: i64,
    pub days: DayPolicy,
    pub trend: TrendPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            inter_batch_delay: Duration::from_millis(1500),
            anomaly_threshold_pct: Decimal::from(20),
            anomaly_recheck_delay: Duration::from_secs(60),
            stale_after: chrono::Duration::hours(24),
            scan_limit: 500,
            days: DayPolicy::utc(),
            trend: TrendPolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            inter_batch_delay: config.inter_batch_delay(),
            anomaly_threshold_pct: config.anomaly_threshold_pct,
            anomaly_recheck_delay: config.anomaly_recheck_delay(),
            stale_after: chrono::Duration::hours(config.stale_after_hours),
            scan_limit: config.scan_limit,
            days: config.day_policy,
            trend: config.trend_policy(),
        }
    }
}

/// Named steps of one listing's cycle, logged at `trace` as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    FetchBatch,
    ReconcileAnomaly,
    PersistHistory,
    ComputeTrend,
    Commit,
}

impl SyncState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::FetchBatch => "fetch_batch",
            SyncState::ReconcileAnomaly => "reconcile_anomaly",
            SyncState::PersistHistory => "persist_history",
            SyncState::ComputeTrend => "compute_trend",
            SyncState::Commit => "commit",
        }
    }
}

/// A price ready to be committed, with whatever listing metadata came with it.
#[derive(Debug, Clone)]
struct Candidate {
    price: Decimal,
    merchant: Option<String>,
    rating: Option<Decimal>,
    rating_count: Option<i32>,
    origin: PriceOrigin,
}

impl Candidate {
    fn from_api(record: FetchedPrice) -> Self {
        Self {
            price: record.price,
            merchant: record.merchant,
            rating: record.rating,
            rating_count: record.rating_count,
            origin: PriceOrigin::Api,
        }
    }

    /// Fallback tiers never learn the merchant, so the stored one is kept.
    fn from_fallback(recovered: RecoveredPrice, record: Option<&FetchedPrice>) -> Self {
        Self {
            price: recovered.price,
            merchant: None,
            rating: record.and_then(|r| r.rating),
            rating_count: record.and_then(|r| r.rating_count),
            origin: recovered.tier.into(),
        }
    }
}

/// Drives listings from the catalog through fetch, fallback, anomaly
/// reconciliation, history and trend to a committed row.
///
/// One instance corresponds to one run: it remembers every identifier it
/// has handled and skips repeats.
pub struct SyncOrchestrator<P, F, S> {
    source: P,
    fallback: F,
    store: S,
    settings: OrchestratorSettings,
    trend: TrendEngine,
    clock: Arc<dyn Clock>,
    cancel: Arc<AtomicBool>,
    processed: HashSet<String>,
}

impl<P, F, S> SyncOrchestrator<P, F, S>
where
    P: PriceSource,
    F: FallbackSource,
    S: CatalogStore,
{
    pub fn new(source: P, fallback: F, store: S, settings: OrchestratorSettings) -> Self {
        Self {
            source,
            fallback,
            store,
            trend: TrendEngine::new(settings.trend, settings.days),
            settings,
            clock: Arc::new(SystemClock),
            cancel: Arc::new(AtomicBool::new(false)),
            processed: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an externally owned cancellation flag, e.g. one flipped by a
    /// Ctrl-C handler.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of distinct identifiers handled so far in this run.
    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Forgets every identifier handled so far, so the next request for one
    /// of them is synced again instead of being skipped as a duplicate.
    pub fn clear_processed(&mut self) {
        self.processed.clear();
    }

    /// Acquires run-scoped fallback resources. [`SyncOrchestrator::run_scan`]
    /// and [`SyncOrchestrator::run_ids`] do this themselves; callers driving
    /// [`SyncOrchestrator::sync_one`] in a loop call it once up front.
    pub async fn open(&self) {
        self.fallback.open().await;
    }

    pub async fn close(&self) {
        self.fallback.close().await;
    }

    /// Refreshes up to `scan_limit` listings not synced within `stale_after`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the catalog cannot be read or written.
    pub async fn run_scan(&mut self) -> Result<RunSummary, SyncError> {
        let stale_before = self.clock.now() - self.settings.stale_after;
        let listings = self
            .store
            .stale_listings(stale_before, self.settings.scan_limit)
            .await?;
        tracing::info!(
            count = listings.len(),
            stale_before = %stale_before,
            "selected stale listings"
        );
        self.run_listings(listings, RunSummary::default()).await
    }

    /// Refreshes the named listings in the order given. Identifiers that are
    /// not active catalog listings are counted as unknown.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the catalog cannot be read or written.
    pub async fn run_ids(&mut self, ids: &[String]) -> Result<RunSummary, SyncError> {
        let found = self.store.listings_by_external_ids(ids).await?;
        let by_id: HashMap<&str, &Listing> =
            found.iter().map(|l| (l.external_id.as_str(), l)).collect();

        let mut summary = RunSummary::default();
        let mut listings = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.get(id.as_str()) {
                Some(listing) => listings.push((*listing).clone()),
                None => {
                    tracing::warn!(identifier = %id, "not an active catalog listing; skipping");
                    summary.record(&ListingOutcome::Unknown);
                }
            }
        }
        self.run_listings(listings, summary).await
    }

    /// Runs one identifier through a full cycle. Used by the queue consumer,
    /// which owns the fallback lifetime via [`SyncOrchestrator::open`] and
    /// [`SyncOrchestrator::close`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the catalog cannot be read or written.
    pub async fn sync_one(&mut self, external_id: &str) -> Result<ListingOutcome, SyncError> {
        if !self.processed.insert(external_id.to_owned()) {
            tracing::debug!(identifier = %external_id, "already handled in this run");
            return Ok(ListingOutcome::Duplicate);
        }

        let ids = [external_id.to_owned()];
        let Some(listing) = self.store.listings_by_external_ids(&ids).await?.pop() else {
            tracing::warn!(identifier = %external_id, "not an active catalog listing; dropping");
            return Ok(ListingOutcome::Unknown);
        };

        self.enter(&listing, SyncState::FetchBatch);
        let record = self
            .source
            .fetch_batch(&ids)
            .await
            .into_iter()
            .find(|r| r.external_id == listing.external_id)
            .unwrap_or_else(|| FetchedPrice::error(&listing.external_id));
        self.process_listing(&listing, record).await
    }

    async fn run_listings(
        &mut self,
        listings: Vec<Listing>,
        mut summary: RunSummary,
    ) -> Result<RunSummary, SyncError> {
        let mut pending = Vec::with_capacity(listings.len());
        for listing in listings {
            if self.processed.insert(listing.external_id.clone()) {
                pending.push(listing);
            } else {
                summary.record(&ListingOutcome::Duplicate);
            }
        }

        self.open().await;
        let result = self.drive(&pending, &mut summary).await;
        self.close().await;
        result.map(|()| summary)
    }

    async fn drive(&self, pending: &[Listing], summary: &mut RunSummary) -> Result<(), SyncError> {
        let batch_size = self.source.batch_size().max(1);
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
            if self.is_cancelled() {
                summary.cancelled = true;
                tracing::warn!(
                    remaining = pending.len() - index * batch_size,
                    "run cancelled; remaining listings left for the next run"
                );
                break;
            }
            self.process_batch(batch, summary).await?;
            if summary.cancelled {
                break;
            }
        }
        Ok(())
    }

    async fn process_batch(
        &self,
        batch: &[Listing],
        summary: &mut RunSummary,
    ) -> Result<(), SyncError> {
        let ids: Vec<String> = batch.iter().map(|l| l.external_id.clone()).collect();
        tracing::debug!(size = ids.len(), "fetching batch");

        let mut fetched: HashMap<String, FetchedPrice> = self
            .source
            .fetch_batch(&ids)
            .await
            .into_iter()
            .map(|r| (r.external_id.clone(), r))
            .collect();

        for listing in batch {
            if self.is_cancelled() {
                summary.cancelled = true;
                tracing::warn!(identifier = %listing.external_id, "run cancelled mid-batch");
                break;
            }
            self.enter(listing, SyncState::FetchBatch);
            let record = fetched
                .remove(&listing.external_id)
                .unwrap_or_else(|| FetchedPrice::error(&listing.external_id));
            let outcome = self.process_listing(listing, record).await?;
            summary.record(&outcome);
        }
        Ok(())
    }

    async fn process_listing(
        &self,
        listing: &Listing,
        record: FetchedPrice,
    ) -> Result<ListingOutcome, SyncError> {
        let id = listing.external_id.as_str();

        let candidate = match record.status {
            FetchStatus::Ok if record.is_usable() => Candidate::from_api(record),
            FetchStatus::Excluded => {
                tracing::info!(
                    identifier = %id,
                    merchant = record.merchant.as_deref().unwrap_or_default(),
                    "winning merchant is excluded; clearing price"
                );
                return self
                    .commit_without_price(listing, &record, ListingOutcome::Excluded)
                    .await;
            }
            FetchStatus::NotFound => {
                tracing::info!(identifier = %id, "identifier unknown at source");
                return Ok(self.soft_failure(listing, SoftFailure::NotFound));
            }
            FetchStatus::Ok | FetchStatus::OutOfStock => match self.fallback.recover(id).await {
                Some(recovered) => Candidate::from_fallback(recovered, Some(&record)),
                None => {
                    tracing::info!(
                        identifier = %id,
                        "no listing carries a price; marking unavailable"
                    );
                    return self
                        .commit_without_price(listing, &record, ListingOutcome::OutOfStock)
                        .await;
                }
            },
            FetchStatus::Error => match self.fallback.recover(id).await {
                Some(recovered) => Candidate::from_fallback(recovered, None),
                None => {
                    tracing::warn!(identifier = %id, "fetch and every fallback tier failed");
                    return Ok(self.soft_failure(listing, SoftFailure::FetchFailed));
                }
            },
        };

        let Some((candidate, anomaly)) = self.reconcile_anomaly(listing, candidate).await else {
            return Ok(self.soft_failure(listing, SoftFailure::RecheckFailed));
        };
        self.persist_and_commit(listing, candidate, anomaly).await
    }

    /// Rechecks a price that jumped past the threshold. `None` means the
    /// recheck produced no usable price.
    async fn reconcile_anomaly(
        &self,
        listing: &Listing,
        candidate: Candidate,
    ) -> Option<(Candidate, AnomalyResolution)> {
        let stored = listing.price;
        if !listing.has_usable_price() || !self.deviates(stored, candidate.price) {
            return Some((candidate, AnomalyResolution::None));
        }

        self.enter(listing, SyncState::ReconcileAnomaly);
        let id = listing.external_id.as_str();
        tracing::warn!(
            identifier = %id,
            stored = %stored,
            fetched = %candidate.price,
            origin = ?candidate.origin,
            delay_secs = self.settings.anomaly_recheck_delay.as_secs(),
            "price anomaly; rechecking after delay"
        );
        if !self.settings.anomaly_recheck_delay.is_zero() {
            tokio::time::sleep(self.settings.anomaly_recheck_delay).await;
        }

        let recheck = match candidate.origin {
            PriceOrigin::Api => self
                .source
                .fetch_batch(&[id.to_owned()])
                .await
                .into_iter()
                .find(|r| r.external_id == id && r.is_usable())
                .map(Candidate::from_api),
            PriceOrigin::StaticPage | PriceOrigin::Browser => self
                .fallback
                .recover(id)
                .await
                .map(|r| Candidate::from_fallback(r, None)),
        };
        let Some(recheck) = recheck else {
            tracing::warn!(
                identifier = %id,
                "anomaly recheck returned no price; leaving listing untouched"
            );
            return None;
        };

        let resolution = if !self.deviates(candidate.price, recheck.price) {
            AnomalyResolution::Confirmed
        } else if !self.deviates(stored, recheck.price) {
            AnomalyResolution::Reverted
        } else {
            AnomalyResolution::Unconfirmed
        };

        match resolution {
            AnomalyResolution::Unconfirmed => tracing::error!(
                identifier = %id,
                stored = %stored,
                first = %candidate.price,
                recheck = %recheck.price,
                "anomaly unconfirmed; committing recheck price"
            ),
            _ => tracing::warn!(
                identifier = %id,
                stored = %stored,
                first = %candidate.price,
                recheck = %recheck.price,
                resolution = ?resolution,
                "anomaly resolved"
            ),
        }
        Some((recheck, resolution))
    }

    async fn persist_and_commit(
        &self,
        listing: &Listing,
        candidate: Candidate,
        anomaly: AnomalyResolution,
    ) -> Result<ListingOutcome, SyncError> {
        let now = self.clock.now();

        self.enter(listing, SyncState::PersistHistory);
        let observation = PriceObservation {
            listing_id: listing.id,
            price: candidate.price,
            observed_at: now,
        };
        let appended = self
            .store
            .append_observation(&observation, self.settings.days)
            .await?;

        self.enter(listing, SyncState::ComputeTrend);
        let signals = self.signals(listing, candidate.price).await?;

        self.enter(listing, SyncState::Commit);
        self.store
            .commit_listing(
                listing.id,
                &ListingCommit {
                    price: candidate.price,
                    merchant: candidate.merchant.as_deref(),
                    rating: candidate.rating,
                    rating_count: candidate.rating_count,
                    signals: &signals,
                    synced_at: now,
                },
            )
            .await?;

        tracing::info!(
            identifier = %listing.external_id,
            price = %candidate.price,
            origin = ?candidate.origin,
            appended,
            discount_percent = ?signals.discount_percent,
            lowest_30d = signals.is_lowest_in_30d,
            lowest_7d = signals.is_lowest_in_7d,
            "listing committed"
        );
        self.enter(listing, SyncState::Idle);

        Ok(ListingOutcome::Committed {
            price: candidate.price,
            origin: candidate.origin,
            anomaly,
            appended,
        })
    }

    /// Commits the zero sentinel. No observation is written.
    async fn commit_without_price(
        &self,
        listing: &Listing,
        record: &FetchedPrice,
        outcome: ListingOutcome,
    ) -> Result<ListingOutcome, SyncError> {
        let now = self.clock.now();
        self.enter(listing, SyncState::ComputeTrend);
        let signals = self.signals(listing, Decimal::ZERO).await?;

        self.enter(listing, SyncState::Commit);
        self.store
            .commit_listing(
                listing.id,
                &ListingCommit {
                    price: Decimal::ZERO,
                    merchant: record.merchant.as_deref(),
                    rating: record.rating,
                    rating_count: record.rating_count,
                    signals: &signals,
                    synced_at: now,
                },
            )
            .await?;
        self.enter(listing, SyncState::Idle);
        Ok(outcome)
    }

    async fn signals(&self, listing: &Listing, price: Decimal) -> Result<TrendSnapshot, SyncError> {
        let now = self.clock.now();
        let history = self
            .store
            .history_since(listing.id, HistoryWindow::Last30Days.since(now))
            .await?;
        Ok(self.trend.compute(&history, price, now))
    }

    fn soft_failure(&self, listing: &Listing, reason: SoftFailure) -> ListingOutcome {
        tracing::info!(
            identifier = %listing.external_id,
            reason = reason.as_str(),
            "soft failure; stored price unchanged"
        );
        self.enter(listing, SyncState::Idle);
        ListingOutcome::SoftFailure { reason }
    }

    /// `true` when `new` is further than the anomaly threshold from a
    /// positive `base`, in percent of `base`.
    fn deviates(&self, base: Decimal, new: Decimal) -> bool {
        if base <= Decimal::ZERO {
            return false;
        }
        let pct = (new - base).abs() / base * Decimal::ONE_HUNDRED;
        pct > self.settings.anomaly_threshold_pct
    }

    fn enter(&self, listing: &Listing, state: SyncState) {
        tracing::trace!(identifier = %listing.external_id, state = state.as_str(), "state");
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
