//! Live integration tests for pricesync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database from the sqlx
//! test harness. The `migrations` path is relative to the crate root
//! (`crates/pricesync-db/`), so `"../../migrations"` resolves to the
//! workspace migration directory.

use chrono::{DateTime, Utc};
use pricesync_core::{DayPolicy, SyncReason, TrendSnapshot};
use pricesync_db::{
    append_observation_if_changed, commit_listing, complete_sync_run, create_sync_run,
    fail_sync_run, get_listing_by_external_id, get_sync_run, list_listings_by_external_ids,
    list_observations_since, list_stale_listings, start_sync_run, DbError, ListingCommit,
    SyncRunCounts,
};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert a listing row and return its generated `id`.
async fn insert_test_listing(
    pool: &sqlx::PgPool,
    external_id: &str,
    merchant: Option<&str>,
    last_synced_at: Option<DateTime<Utc>>,
    is_active: bool,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO listings (external_id, title, price, merchant, rating, rating_count, \
                               last_synced_at, is_active) \
         VALUES ($1, $2, 100.00, $3, 4.50, 120, $4, $5) RETURNING id",
    )
    .bind(external_id)
    .bind(format!("Listing {external_id}"))
    .bind(merchant)
    .bind(last_synced_at)
    .bind(is_active)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_test_listing failed for '{external_id}': {e}"))
}

async fn history_count(pool: &sqlx::PgPool, listing_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM price_history WHERE listing_id = $1")
        .bind(listing_id)
        .fetch_one(pool)
        .await
        .expect("count price_history")
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn dec(units: i64) -> Decimal {
    Decimal::from(units)
}

// ---------------------------------------------------------------------------
// Section 1: Price history ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn same_day_same_price_is_appended_once(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE01", None, None, true).await;
    let days = DayPolicy::utc();

    let first = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-01T09:00:00Z"),
        days,
        None,
    )
    .await
    .expect("first append");
    let second = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-01T15:00:00Z"),
        days,
        None,
    )
    .await
    .expect("second append");

    assert!(first, "first observation of the day must be written");
    assert!(!second, "same-day repeat at the same price must be skipped");
    assert_eq!(history_count(&pool, listing_id).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn same_day_price_change_is_appended(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE02", None, None, true).await;
    let days = DayPolicy::utc();

    for (price, time) in [
        (dec(10), "2026-03-01T08:00:00Z"),
        (dec(12), "2026-03-01T12:00:00Z"),
        // Back to 10: compared against the latest of the day (12), not the first.
        (dec(10), "2026-03-01T16:00:00Z"),
    ] {
        let written = append_observation_if_changed(&pool, listing_id, price, at(time), days, None)
            .await
            .expect("append");
        assert!(written, "price {price} at {time} should be written");
    }

    assert_eq!(history_count(&pool, listing_id).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unchanged_price_on_next_day_is_appended(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE03", None, None, true).await;
    let days = DayPolicy::utc();

    let late = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-01T23:30:00Z"),
        days,
        None,
    )
    .await
    .expect("late append");
    let early = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-02T00:30:00Z"),
        days,
        None,
    )
    .await
    .expect("next-day append");

    assert!(late);
    assert!(early, "a new calendar day starts a new bucket");
    assert_eq!(history_count(&pool, listing_id).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn day_bounds_follow_the_configured_offset(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE04", None, None, true).await;
    // UTC-5: 15:00Z and 03:00Z the next UTC day are both 2026-03-01 locally.
    let eastern = DayPolicy::with_offset_minutes(-300).expect("valid offset");

    let first = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-01T15:00:00Z"),
        eastern,
        None,
    )
    .await
    .expect("first append");
    let second = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-02T03:00:00Z"),
        eastern,
        None,
    )
    .await
    .expect("second append");
    assert!(first);
    assert!(!second, "same local day under UTC-5");

    // Under UTC the same instant falls on the next day and is written.
    let utc = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-02T03:00:00Z"),
        DayPolicy::utc(),
        None,
    )
    .await
    .expect("utc append");
    assert!(utc);
    assert_eq!(history_count(&pool, listing_id).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn zero_price_is_rejected_by_the_ledger(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE05", None, None, true).await;

    let result = append_observation_if_changed(
        &pool,
        listing_id,
        Decimal::ZERO,
        at("2026-03-01T09:00:00Z"),
        DayPolicy::utc(),
        None,
    )
    .await;

    assert!(matches!(result, Err(DbError::Sqlx(_))));
    assert_eq!(history_count(&pool, listing_id).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn observations_are_read_newest_first_within_window(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE06", None, None, true).await;
    let other_id = insert_test_listing(&pool, "B000LIVE07", None, None, true).await;
    let days = DayPolicy::utc();

    for (price, time) in [
        (dec(9), "2026-01-15T10:00:00Z"),
        (dec(11), "2026-03-01T10:00:00Z"),
        (dec(13), "2026-03-03T10:00:00Z"),
        (dec(12), "2026-03-02T10:00:00Z"),
    ] {
        append_observation_if_changed(&pool, listing_id, price, at(time), days, None)
            .await
            .expect("append");
    }
    append_observation_if_changed(
        &pool,
        other_id,
        dec(50),
        at("2026-03-02T11:00:00Z"),
        days,
        None,
    )
    .await
    .expect("append other");

    let rows = list_observations_since(&pool, listing_id, at("2026-02-01T00:00:00Z"))
        .await
        .expect("list observations");

    let prices: Vec<Decimal> = rows.iter().map(|r| r.price).collect();
    assert_eq!(prices, vec![dec(13), dec(12), dec(11)]);
    assert!(rows.iter().all(|r| r.listing_id == listing_id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn observations_with_equal_timestamps_are_ordered_by_id(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE08", None, None, true).await;
    let instant = at("2026-03-01T10:00:00Z");

    let first = append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        instant,
        DayPolicy::utc(),
        None,
    )
    .await
    .expect("first");
    let second = append_observation_if_changed(
        &pool,
        listing_id,
        dec(11),
        instant,
        DayPolicy::utc(),
        None,
    )
    .await
    .expect("second");
    assert!(first && second);

    let rows = list_observations_since(&pool, listing_id, at("2026-03-01T00:00:00Z"))
        .await
        .expect("list observations");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].id > rows[1].id);
    assert_eq!(rows[0].price, dec(11));
}

#[sqlx::test(migrations = "../../migrations")]
async fn observation_is_tagged_with_sync_run(pool: sqlx::PgPool) {
    let listing_id = insert_test_listing(&pool, "B000LIVE09", None, None, true).await;
    let run = create_sync_run(&pool, SyncReason::Scan)
        .await
        .expect("create_sync_run failed");

    append_observation_if_changed(
        &pool,
        listing_id,
        dec(10),
        at("2026-03-01T10:00:00Z"),
        DayPolicy::utc(),
        Some(run.id),
    )
    .await
    .expect("append");

    let rows = list_observations_since(&pool, listing_id, at("2026-03-01T00:00:00Z"))
        .await
        .expect("list observations");
    assert_eq!(rows[0].sync_run_id, Some(run.id));
}

// ---------------------------------------------------------------------------
// Section 2: Listings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn commit_keeps_stored_merchant_and_rating_when_absent(pool: sqlx::PgPool) {
    let listing_id =
        insert_test_listing(&pool, "B000LIVE10", Some("Stored Merchant"), None, true).await;
    let signals = TrendSnapshot {
        average_price_30d: Some(dec(100)),
        lowest_price_30d: Some(dec(94)),
        lowest_price_7d: Some(dec(94)),
        is_lowest_in_30d: true,
        is_lowest_in_7d: false,
        discount_percent: Some(6),
    };
    let synced_at = at("2026-03-01T12:00:00Z");

    commit_listing(
        &pool,
        listing_id,
        &ListingCommit {
            price: dec(94),
            merchant: None,
            rating: None,
            rating_count: None,
            signals: &signals,
            synced_at,
        },
    )
    .await
    .expect("commit_listing failed");

    let row = get_listing_by_external_id(&pool, "B000LIVE10")
        .await
        .expect("get listing");
    assert_eq!(row.price, dec(94));
    assert_eq!(row.merchant.as_deref(), Some("Stored Merchant"));
    assert_eq!(row.rating, Some(Decimal::new(450, 2)));
    assert_eq!(row.rating_count, Some(120));
    assert_eq!(row.discount_percent, Some(6));
    assert!(row.is_lowest_30d);
    assert!(!row.is_lowest_7d);
    assert_eq!(row.average_price_30d, Some(dec(100)));
    assert_eq!(row.last_synced_at, Some(synced_at));
}

#[sqlx::test(migrations = "../../migrations")]
async fn commit_overwrites_merchant_and_clears_signals(pool: sqlx::PgPool) {
    let listing_id =
        insert_test_listing(&pool, "B000LIVE11", Some("Stored Merchant"), None, true).await;
    let signals = TrendSnapshot::default();

    commit_listing(
        &pool,
        listing_id,
        &ListingCommit {
            price: Decimal::ZERO,
            merchant: Some("Excluded Reseller"),
            rating: Some(Decimal::new(390, 2)),
            rating_count: Some(15),
            signals: &signals,
            synced_at: at("2026-03-01T12:00:00Z"),
        },
    )
    .await
    .expect("commit_listing failed");

    let row = get_listing_by_external_id(&pool, "B000LIVE11")
        .await
        .expect("get listing");
    assert_eq!(row.price, Decimal::ZERO);
    assert_eq!(row.merchant.as_deref(), Some("Excluded Reseller"));
    assert_eq!(row.rating, Some(Decimal::new(390, 2)));
    assert_eq!(row.rating_count, Some(15));
    assert_eq!(row.discount_percent, None);
    assert_eq!(row.average_price_30d, None);
    assert!(!row.is_lowest_30d && !row.is_lowest_7d);
}

#[sqlx::test(migrations = "../../migrations")]
async fn commit_to_unknown_listing_is_not_found(pool: sqlx::PgPool) {
    let signals = TrendSnapshot::default();
    let result = commit_listing(
        &pool,
        999_999,
        &ListingCommit {
            price: dec(10),
            merchant: None,
            rating: None,
            rating_count: None,
            signals: &signals,
            synced_at: at("2026-03-01T12:00:00Z"),
        },
    )
    .await;

    assert!(matches!(result, Err(DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_listings_put_never_synced_first_and_skip_inactive(pool: sqlx::PgPool) {
    insert_test_listing(&pool, "B000FRESH", None, Some(at("2026-03-01T11:00:00Z")), true).await;
    insert_test_listing(&pool, "B000OLDER", None, Some(at("2026-02-20T00:00:00Z")), true).await;
    insert_test_listing(&pool, "B000OLD", None, Some(at("2026-02-25T00:00:00Z")), true).await;
    insert_test_listing(&pool, "B000NEVER", None, None, true).await;
    insert_test_listing(&pool, "B000RETIRED", None, None, false).await;

    let rows = list_stale_listings(&pool, at("2026-03-01T00:00:00Z"), 10)
        .await
        .expect("list_stale_listings failed");
    let ids: Vec<&str> = rows.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["B000NEVER", "B000OLDER", "B000OLD"]);

    let limited = list_stale_listings(&pool, at("2026-03-01T00:00:00Z"), 1)
        .await
        .expect("list_stale_listings failed");
    assert_eq!(limited.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn lookup_by_ids_skips_unknown_and_inactive(pool: sqlx::PgPool) {
    insert_test_listing(&pool, "B000ACTIVE", None, None, true).await;
    insert_test_listing(&pool, "B000RETIRED", None, None, false).await;

    let ids = vec![
        "B000ACTIVE".to_string(),
        "B000RETIRED".to_string(),
        "B000MISSING".to_string(),
    ];
    let rows = list_listings_by_external_ids(&pool, &ids)
        .await
        .expect("lookup failed");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].external_id, "B000ACTIVE");
    assert!(matches!(
        get_listing_by_external_id(&pool, "B000RETIRED").await,
        Err(DbError::NotFound)
    ));
}

// ---------------------------------------------------------------------------
// Section 3: Sync run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncReason::Queue)
        .await
        .expect("create_sync_run failed");
    assert_eq!(run.status, "queued");
    assert_eq!(run.trigger_source, "queue");
    assert!(run.started_at.is_none());

    start_sync_run(&pool, run.id)
        .await
        .expect("start_sync_run failed");
    let counts = SyncRunCounts {
        listings_seen: 5,
        committed: 3,
        recovered: 1,
        soft_failures: 2,
        anomalies: 1,
    };
    complete_sync_run(&pool, run.id, counts)
        .await
        .expect("complete_sync_run failed");

    let done = get_sync_run(&pool, run.id).await.expect("get_sync_run failed");
    assert_eq!(done.status, "succeeded");
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert_eq!(done.listings_seen, 5);
    assert_eq!(done.committed, 3);
    assert_eq!(done.recovered, 1);
    assert_eq!(done.soft_failures, 2);
    assert_eq!(done.anomalies, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_failure_records_message(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncReason::Scan)
        .await
        .expect("create_sync_run failed");
    start_sync_run(&pool, run.id)
        .await
        .expect("start_sync_run failed");

    fail_sync_run(&pool, run.id, "pool timed out", SyncRunCounts::default())
        .await
        .expect("fail_sync_run failed");

    let failed = get_sync_run(&pool, run.id).await.expect("get_sync_run failed");
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.error_message.as_deref(), Some("pool timed out"));
    assert!(failed.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_cannot_finish_from_queued(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncReason::Manual)
        .await
        .expect("create_sync_run failed");

    let complete = complete_sync_run(&pool, run.id, SyncRunCounts::default()).await;
    assert!(matches!(
        complete,
        Err(DbError::InvalidSyncRunTransition {
            expected_status: "running",
            ..
        })
    ));

    let fail = fail_sync_run(&pool, run.id, "boom", SyncRunCounts::default()).await;
    assert!(matches!(
        fail,
        Err(DbError::InvalidSyncRunTransition { .. })
    ));

    let row = get_sync_run(&pool, run.id).await.expect("get_sync_run failed");
    assert_eq!(row.status, "queued");
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_cannot_start_twice_or_complete_twice(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncReason::Scan)
        .await
        .expect("create_sync_run failed");
    start_sync_run(&pool, run.id)
        .await
        .expect("start_sync_run failed");

    assert!(matches!(
        start_sync_run(&pool, run.id).await,
        Err(DbError::InvalidSyncRunTransition {
            expected_status: "queued",
            ..
        })
    ));

    complete_sync_run(&pool, run.id, SyncRunCounts::default())
        .await
        .expect("complete_sync_run failed");
    assert!(matches!(
        complete_sync_run(&pool, run.id, SyncRunCounts::default()).await,
        Err(DbError::InvalidSyncRunTransition { .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_start_fails_for_unknown_id(pool: sqlx::PgPool) {
    let result = start_sync_run(&pool, 999_999).await;
    assert!(matches!(
        result,
        Err(DbError::InvalidSyncRunTransition { id: 999_999, .. })
    ));
    assert!(matches!(
        get_sync_run(&pool, 999_999).await,
        Err(DbError::NotFound)
    ));
}
