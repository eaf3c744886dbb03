//! Database operations for `listings`, the catalog rows the engine refreshes.
//!
//! The catalog owns these rows. The engine reads them and rewrites only the
//! price, merchant, rating, derived signal and `last_synced_at` columns.

use chrono::{DateTime, Utc};
use pricesync_core::{Listing, TrendSnapshot};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const LISTING_COLUMNS: &str = "id, external_id, price, merchant, affiliate_url, rating, \
                               rating_count, discount_percent, is_lowest_30d, is_lowest_7d, \
                               average_price_30d, last_synced_at, updated_at";

/// A row from the `listings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub id: i64,
    pub external_id: String,
    /// `NUMERIC(12,2) NOT NULL DEFAULT 0`; zero is the "no usable price" sentinel.
    pub price: Decimal,
    pub merchant: Option<String>,
    pub affiliate_url: Option<String>,
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub discount_percent: Option<i32>,
    pub is_lowest_30d: bool,
    pub is_lowest_7d: bool,
    pub average_price_30d: Option<Decimal>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Listing {
            id: row.id,
            external_id: row.external_id,
            price: row.price,
            merchant: row.merchant,
            affiliate_url: row.affiliate_url,
            rating: row.rating,
            rating_count: row.rating_count,
            last_synced_at: row.last_synced_at,
        }
    }
}

/// The fields one sync cycle writes back for a listing.
///
/// `None` for `merchant`, `rating` or `rating_count` keeps the stored value.
#[derive(Debug, Clone)]
pub struct ListingCommit<'a> {
    pub price: Decimal,
    pub merchant: Option<&'a str>,
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub signals: &'a TrendSnapshot,
    pub synced_at: DateTime<Utc>,
}

/// Fetches one active listing by its marketplace identifier.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no active listing carries the identifier,
/// or [`DbError::Sqlx`] if the query fails.
pub async fn get_listing_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<ListingRow, DbError> {
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE external_id = $1 AND is_active = true"
    );
    sqlx::query_as::<_, ListingRow>(&sql)
        .bind(external_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the active listings among `external_ids`. Unknown identifiers are
/// simply absent from the result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_listings_by_external_ids(
    pool: &PgPool,
    external_ids: &[String],
) -> Result<Vec<ListingRow>, DbError> {
    if external_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings \
         WHERE external_id = ANY($1) AND is_active = true \
         ORDER BY id"
    );
    let rows = sqlx::query_as::<_, ListingRow>(&sql)
        .bind(external_ids)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns up to `limit` active listings not synced since `stale_before`,
/// never-synced listings first, then oldest sync first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_listings(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ListingRow>, DbError> {
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings \
         WHERE is_active = true \
           AND (last_synced_at IS NULL OR last_synced_at < $1) \
         ORDER BY last_synced_at ASC NULLS FIRST, id ASC \
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, ListingRow>(&sql)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Writes one cycle's result and derived signals to the listing row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the listing no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn commit_listing(
    pool: &PgPool,
    listing_id: i64,
    commit: &ListingCommit<'_>,
) -> Result<(), DbError> {
    let discount = commit
        .signals
        .discount_percent
        .map(|d| i32::try_from(d).unwrap_or(i32::MAX));

    let result = sqlx::query(
        "UPDATE listings SET \
             price             = $2::numeric(12,2), \
             merchant          = COALESCE($3, merchant), \
             rating            = COALESCE($4, rating), \
             rating_count      = COALESCE($5, rating_count), \
             discount_percent  = $6, \
             is_lowest_30d     = $7, \
             is_lowest_7d      = $8, \
             average_price_30d = $9, \
             last_synced_at    = $10, \
             updated_at        = NOW() \
         WHERE id = $1",
    )
    .bind(listing_id)
    .bind(commit.price)
    .bind(commit.merchant)
    .bind(commit.rating)
    .bind(commit.rating_count)
    .bind(discount)
    .bind(commit.signals.is_lowest_in_30d)
    .bind(commit.signals.is_lowest_in_7d)
    .bind(commit.signals.average_price_30d)
    .bind(commit.synced_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
