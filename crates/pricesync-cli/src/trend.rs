use chrono::Utc;
use pricesync_core::{AppConfig, PriceObservation, TrendEngine};

/// Recomputes the trend signals for one listing from its stored history
/// and prints them next to what is currently persisted. Nothing is written.
pub(crate) async fn print_trend(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    identifier: &str,
) -> anyhow::Result<()> {
    let listing = pricesync_db::get_listing_by_external_id(pool, identifier).await?;
    let now = Utc::now();
    let history: Vec<PriceObservation> =
        pricesync_db::list_observations_since(pool, listing.id, now - chrono::Duration::days(30))
            .await?
            .into_iter()
            .map(PriceObservation::from)
            .collect();

    let engine = TrendEngine::new(config.trend_policy(), config.day_policy);
    let snapshot = engine.compute(&history, listing.price, now);

    let report = serde_json::json!({
        "identifier": listing.external_id,
        "price": listing.price,
        "observations_30d": history.len(),
        "computed": snapshot,
        "stored": {
            "average_price_30d": listing.average_price_30d,
            "discount_percent": listing.discount_percent,
            "is_lowest_30d": listing.is_lowest_30d,
            "is_lowest_7d": listing.is_lowest_7d,
            "last_synced_at": listing.last_synced_at,
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
