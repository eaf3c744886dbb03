//! Production implementations of the orchestrator's ports.

use chrono::{DateTime, Utc};
use pricesync_aws::{QueueClient, QueueError, QueueMessage};
use pricesync_core::{DayPolicy, FetchedPrice, Listing, PriceObservation};
use pricesync_db::{DbError, ListingCommit};
use pricesync_paapi::PaapiClient;
use pricesync_scraper::{RecoveredPrice, ScrapeFallbackChain};
use sqlx::PgPool;

use crate::ports::{CatalogStore, FallbackSource, PriceSource, WorkQueue};

impl PriceSource for PaapiClient {
    async fn fetch_batch(&self, ids: &[String]) -> Vec<FetchedPrice> {
        PaapiClient::fetch_batch(self, ids).await
    }

    fn batch_size(&self) -> usize {
        PaapiClient::batch_size(self)
    }
}

impl FallbackSource for ScrapeFallbackChain {
    async fn open(&self) {
        ScrapeFallbackChain::open(self).await;
    }

    async fn recover(&self, external_id: &str) -> Option<RecoveredPrice> {
        ScrapeFallbackChain::recover(self, external_id).await
    }

    async fn close(&self) {
        ScrapeFallbackChain::close(self).await;
    }
}

impl WorkQueue for QueueClient {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        QueueClient::receive(self).await
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.delete(receipt_handle).await
    }
}

/// Postgres-backed catalog. Observations appended through it are tagged
/// with the owning sync run when one is set.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
    sync_run_id: Option<i64>,
}

impl PgCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sync_run_id: None,
        }
    }

    #[must_use]
    pub fn with_sync_run(mut self, sync_run_id: i64) -> Self {
        self.sync_run_id = Some(sync_run_id);
        self
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CatalogStore for PgCatalog {
    async fn listings_by_external_ids(&self, ids: &[String]) -> Result<Vec<Listing>, DbError> {
        let rows = pricesync_db::list_listings_by_external_ids(&self.pool, ids).await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn stale_listings(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Listing>, DbError> {
        let rows = pricesync_db::list_stale_listings(&self.pool, stale_before, limit).await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn append_observation(
        &self,
        observation: &PriceObservation,
        days: DayPolicy,
    ) -> Result<bool, DbError> {
        pricesync_db::append_observation_if_changed(
            &self.pool,
            observation.listing_id,
            observation.price,
            observation.observed_at,
            days,
            self.sync_run_id,
        )
        .await
    }

    async fn history_since(
        &self,
        listing_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, DbError> {
        let rows = pricesync_db::list_observations_since(&self.pool, listing_id, since).await?;
        Ok(rows.into_iter().map(PriceObservation::from).collect())
    }

    async fn commit_listing(
        &self,
        listing_id: i64,
        commit: &ListingCommit<'_>,
    ) -> Result<(), DbError> {
        pricesync_db::commit_listing(&self.pool, listing_id, commit).await
    }
}
