//! Offline tests for pricesync-db pool configuration and row conversions.
//! None of these need a live database connection.

use chrono::{TimeZone, Utc};
use pricesync_core::{AppConfig, DayPolicy, Environment, Listing, PriceObservation};
use pricesync_db::{ListingRow, PoolConfig, PriceHistoryRow, SyncRunCounts, SyncRunRow};
use rust_decimal::Decimal;
use uuid::Uuid;

fn app_config(max: u32, min: u32) -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: max,
        db_min_connections: min,
        db_acquire_timeout_secs: 9,
        paapi_access_key: "AKIDEXAMPLE".to_string(),
        paapi_secret_key: "secret".to_string(),
        paapi_partner_tag: "store-20".to_string(),
        paapi_host: "webservices.amazon.com".to_string(),
        paapi_region: "us-east-1".to_string(),
        paapi_marketplace: "www.amazon.com".to_string(),
        paapi_endpoint: "https://webservices.amazon.com".to_string(),
        batch_size: 10,
        inter_batch_delay_ms: 1500,
        request_timeout_secs: 20,
        retry_max_attempts: 3,
        retry_backoff_ms: 2000,
        anomaly_threshold_pct: Decimal::from(20),
        anomaly_recheck_delay_secs: 60,
        significant_drop_ratio: Decimal::new(98, 2),
        min_discount_pct: 5,
        excluded_merchants: Vec::new(),
        stale_after_hours: 24,
        scan_limit: 500,
        day_policy: DayPolicy::utc(),
        schedule_cron: "0 0 */6 * * *".to_string(),
        scrape_fallback_enabled: true,
        browser_fallback_enabled: false,
        scrape_base_url: "https://www.amazon.com".to_string(),
        browser_webdriver_url: "http://localhost:9515".to_string(),
        queue: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config(42, 7));
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn pool_config_never_keeps_more_idle_than_max() {
    let pool_config = PoolConfig::from_app_config(&app_config(2, 5));
    assert_eq!(pool_config.min_connections, 2);
}

#[test]
fn listing_row_converts_to_domain_listing() {
    let synced = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let row = ListingRow {
        id: 7,
        external_id: "B000TEST01".to_string(),
        price: Decimal::new(2499, 2),
        merchant: Some("Amazon.com".to_string()),
        affiliate_url: Some("https://www.amazon.com/dp/B000TEST01?tag=store-20".to_string()),
        rating: Some(Decimal::new(45, 1)),
        rating_count: Some(1_203),
        discount_percent: Some(6),
        is_lowest_30d: true,
        is_lowest_7d: false,
        average_price_30d: Some(Decimal::new(2650, 2)),
        last_synced_at: Some(synced),
        updated_at: synced,
    };

    let listing = Listing::from(row);
    assert_eq!(listing.id, 7);
    assert_eq!(listing.external_id, "B000TEST01");
    assert_eq!(listing.price, Decimal::new(2499, 2));
    assert_eq!(listing.merchant.as_deref(), Some("Amazon.com"));
    assert_eq!(listing.rating_count, Some(1_203));
    assert_eq!(listing.last_synced_at, Some(synced));
    assert!(listing.has_usable_price());
}

#[test]
fn history_row_converts_to_observation() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
    let row = PriceHistoryRow {
        id: 99,
        listing_id: 7,
        price: Decimal::new(1999, 2),
        observed_at: at,
        sync_run_id: None,
    };
    assert_eq!(
        PriceObservation::from(row),
        PriceObservation {
            listing_id: 7,
            price: Decimal::new(1999, 2),
            observed_at: at,
        }
    );
}

/// Compile-time smoke test for the [`SyncRunRow`] shape.
#[test]
fn sync_run_row_has_expected_fields() {
    let row = SyncRunRow {
        id: 1,
        public_id: Uuid::new_v4(),
        trigger_source: "queue".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        listings_seen: 0,
        committed: 0,
        recovered: 0,
        soft_failures: 0,
        anomalies: 0,
        error_message: None,
        created_at: Utc::now(),
    };
    assert_eq!(row.trigger_source, "queue");
    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());
    assert_eq!(SyncRunCounts::default().listings_seen, 0);
}
