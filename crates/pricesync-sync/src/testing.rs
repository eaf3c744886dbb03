//! In-memory stand-ins for the orchestrator's ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pricesync_aws::{QueueError, QueueMessage};
use pricesync_core::{
    decide_append, AppendDecision, DayPolicy, FetchStatus, FetchedPrice, FixedClock, Listing,
    PriceObservation, TrendSnapshot,
};
use pricesync_db::{DbError, ListingCommit};
use pricesync_scraper::{FallbackTier, RecoveredPrice};
use rust_decimal::Decimal;

use crate::orchestrator::{OrchestratorSettings, SyncOrchestrator};
use crate::ports::{CatalogStore, FallbackSource, PriceSource, WorkQueue};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap()
}

pub fn dec(units: i64) -> Decimal {
    Decimal::from(units)
}

pub fn listing(id: i64, external_id: &str, price: i64) -> Listing {
    Listing {
        id,
        external_id: external_id.to_string(),
        price: dec(price),
        merchant: Some("Stored Merchant".to_string()),
        affiliate_url: None,
        rating: None,
        rating_count: None,
        last_synced_at: None,
    }
}

pub fn ok(external_id: &str, price: i64) -> FetchedPrice {
    FetchedPrice {
        price: dec(price),
        merchant: Some("Amazon.com".to_string()),
        ..FetchedPrice::without_price(external_id, FetchStatus::Ok)
    }
}

pub fn status(external_id: &str, status: FetchStatus) -> FetchedPrice {
    FetchedPrice::without_price(external_id, status)
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        inter_batch_delay: Duration::ZERO,
        anomaly_recheck_delay: Duration::ZERO,
        ..OrchestratorSettings::default()
    }
}

pub fn orchestrator(
    source: FakeSource,
    fallback: FakeFallback,
    store: MemoryStore,
) -> SyncOrchestrator<FakeSource, FakeFallback, MemoryStore> {
    SyncOrchestrator::new(source, fallback, store, settings())
        .with_clock(Arc::new(FixedClock(now())))
}

/// Scripted product API. Each identifier answers from its own queue of
/// responses; an exhausted queue answers with an error record.
#[derive(Clone, Default)]
pub struct FakeSource {
    scripts: Arc<Mutex<HashMap<String, VecDeque<FetchedPrice>>>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    batch_size: usize,
}

impl FakeSource {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    pub fn answer(self, record: FetchedPrice) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(record.external_id.clone())
            .or_default()
            .push_back(record);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl PriceSource for FakeSource {
    async fn fetch_batch(&self, ids: &[String]) -> Vec<FetchedPrice> {
        self.calls.lock().unwrap().push(ids.to_vec());
        let mut scripts = self.scripts.lock().unwrap();
        ids.iter()
            .map(|id| {
                scripts
                    .get_mut(id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or_else(|| FetchedPrice::error(id))
            })
            .collect()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Scripted fallback chain; unscripted identifiers are not recoverable.
#[derive(Clone, Default)]
pub struct FakeFallback {
    prices: Arc<Mutex<HashMap<String, VecDeque<Decimal>>>>,
    recovers: Arc<Mutex<Vec<String>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeFallback {
    pub fn recovers_price(self, external_id: &str, price: i64) -> Self {
        self.prices
            .lock()
            .unwrap()
            .entry(external_id.to_string())
            .or_default()
            .push_back(dec(price));
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.recovers.lock().unwrap().clone()
    }
}

impl FallbackSource for FakeFallback {
    async fn open(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    async fn recover(&self, external_id: &str) -> Option<RecoveredPrice> {
        self.recovers.lock().unwrap().push(external_id.to_string());
        let price = self
            .prices
            .lock()
            .unwrap()
            .get_mut(external_id)
            .and_then(VecDeque::pop_front)?;
        Some(RecoveredPrice {
            price,
            tier: FallbackTier::StaticPage,
        })
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owned copy of a [`ListingCommit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub listing_id: i64,
    pub price: Decimal,
    pub merchant: Option<String>,
    pub signals: TrendSnapshot,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    listings: Arc<Mutex<Vec<Listing>>>,
    history: Arc<Mutex<Vec<PriceObservation>>>,
    commits: Arc<Mutex<Vec<CommitRecord>>>,
    fail_appends: bool,
}

impl MemoryStore {
    pub fn with_listings(listings: Vec<Listing>) -> Self {
        Self {
            listings: Arc::new(Mutex::new(listings)),
            ..Self::default()
        }
    }

    pub fn failing_appends(mut self) -> Self {
        self.fail_appends = true;
        self
    }

    pub fn seed_history(&self, listing_id: i64, price: i64, observed_at: DateTime<Utc>) {
        self.history.lock().unwrap().push(PriceObservation {
            listing_id,
            price: dec(price),
            observed_at,
        });
    }

    pub fn history_for(&self, listing_id: i64) -> Vec<PriceObservation> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.listing_id == listing_id)
            .cloned()
            .collect()
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.commits.lock().unwrap().clone()
    }

    pub fn listing(&self, external_id: &str) -> Listing {
        self.listings
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.external_id == external_id)
            .cloned()
            .unwrap()
    }
}

impl CatalogStore for MemoryStore {
    async fn listings_by_external_ids(&self, ids: &[String]) -> Result<Vec<Listing>, DbError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|l| ids.contains(&l.external_id))
            .cloned()
            .collect())
    }

    async fn stale_listings(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Listing>, DbError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.last_synced_at.is_none_or(|at| at < stale_before))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn append_observation(
        &self,
        observation: &PriceObservation,
        days: DayPolicy,
    ) -> Result<bool, DbError> {
        if self.fail_appends {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let mut history = self.history.lock().unwrap();
        let latest = history
            .iter()
            .filter(|o| o.listing_id == observation.listing_id)
            .max_by_key(|o| o.observed_at);
        match decide_append(latest, observation.price, observation.observed_at, days) {
            AppendDecision::Append => {
                history.push(observation.clone());
                Ok(true)
            }
            AppendDecision::UnchangedToday | AppendDecision::Sentinel => Ok(false),
        }
    }

    async fn history_since(
        &self,
        listing_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, DbError> {
        let mut rows: Vec<PriceObservation> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.listing_id == listing_id && o.observed_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(rows)
    }

    async fn commit_listing(
        &self,
        listing_id: i64,
        commit: &ListingCommit<'_>,
    ) -> Result<(), DbError> {
        let mut listings = self.listings.lock().unwrap();
        let listing = listings
            .iter_mut()
            .find(|l| l.id == listing_id)
            .ok_or(DbError::NotFound)?;
        listing.price = commit.price;
        if let Some(merchant) = commit.merchant {
            listing.merchant = Some(merchant.to_string());
        }
        listing.last_synced_at = Some(commit.synced_at);
        self.commits.lock().unwrap().push(CommitRecord {
            listing_id,
            price: commit.price,
            merchant: listing.merchant.clone(),
            signals: commit.signals.clone(),
        });
        Ok(())
    }
}

/// Scripted queue: each receive pops the next batch of bodies.
#[derive(Clone, Default)]
pub struct FakeQueue {
    batches: Arc<Mutex<VecDeque<Result<Vec<QueueMessage>, QueueError>>>>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl FakeQueue {
    pub fn batch(self, bodies: &[&str]) -> Self {
        let offset = self.batches.lock().unwrap().len() * 100;
        let messages = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| QueueMessage {
                message_id: format!("m-{}", offset + i),
                receipt_handle: format!("r-{}", offset + i),
                body: (*body).to_string(),
            })
            .collect();
        self.batches.lock().unwrap().push_back(Ok(messages));
        self
    }

    pub fn failure(self, error: QueueError) -> Self {
        self.batches.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }
}

impl WorkQueue for FakeQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }
}
