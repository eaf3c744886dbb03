//! Database operations for `price_history`, the append-only observation
//! ledger.

use chrono::{DateTime, Utc};
use pricesync_core::{DayPolicy, PriceObservation};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub listing_id: i64,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
    pub sync_run_id: Option<i64>,
}

impl From<PriceHistoryRow> for PriceObservation {
    fn from(row: PriceHistoryRow) -> Self {
        PriceObservation {
            listing_id: row.listing_id,
            price: row.price,
            observed_at: row.observed_at,
        }
    }
}

/// Appends an observation unless the listing already has one at the same
/// price within the calendar day containing `observed_at`.
///
/// The check and the insert run as one statement so two concurrent cycles
/// cannot both append. The day boundary comes from `days`, not from the
/// database session timezone.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails, including the
/// `price > 0` check constraint for a sentinel price.
pub async fn append_observation_if_changed(
    pool: &PgPool,
    listing_id: i64,
    price: Decimal,
    observed_at: DateTime<Utc>,
    days: DayPolicy,
    sync_run_id: Option<i64>,
) -> Result<bool, DbError> {
    let (day_start, day_end) = days.day_bounds(observed_at);

    let rows_affected = sqlx::query(
        "WITH last_today AS ( \
             SELECT price \
             FROM price_history \
             WHERE listing_id = $1 AND observed_at >= $4 AND observed_at < $5 \
             ORDER BY observed_at DESC, id DESC \
             LIMIT 1 \
         ) \
         INSERT INTO price_history (listing_id, price, observed_at, sync_run_id) \
         SELECT $1, $2::numeric(12,2), $3, $6 \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM last_today WHERE last_today.price = $2::numeric(12,2) \
         )",
    )
    .bind(listing_id)
    .bind(price)
    .bind(observed_at)
    .bind(day_start)
    .bind(day_end)
    .bind(sync_run_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Observations for a listing at or after `since`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_observations_since(
    pool: &PgPool,
    listing_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<PriceHistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, PriceHistoryRow>(
        "SELECT id, listing_id, price, observed_at, sync_run_id \
         FROM price_history \
         WHERE listing_id = $1 AND observed_at >= $2 \
         ORDER BY observed_at DESC, id DESC",
    )
    .bind(listing_id)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
