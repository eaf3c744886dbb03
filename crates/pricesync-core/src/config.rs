use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment, QueueConfig};
use crate::calendar::DayPolicy;
use crate::ConfigError;

/// Largest batch the product API accepts in one signed call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Largest receive count the queue API accepts.
pub const MAX_QUEUE_MESSAGES: u32 = 10;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse/validate configuration through an injectable lookup so tests can
/// use a plain map instead of mutating the process environment.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingEnvVar(var.to_string())),
        }
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: &str| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    };

    let database_url = require("DATABASE_URL")?;
    let paapi_access_key = require("PAAPI_ACCESS_KEY")?;
    let paapi_secret_key = require("PAAPI_SECRET_KEY")?;
    let paapi_partner_tag = require("PAAPI_PARTNER_TAG")?;

    let env = parse_environment(&or_default("PRICESYNC_ENV", "development"))?;
    let log_level = or_default("PRICESYNC_LOG_LEVEL", "info");

    let db_max_connections = parse_value(
        "PRICESYNC_DB_MAX_CONNECTIONS",
        &or_default("PRICESYNC_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_value(
        "PRICESYNC_DB_MIN_CONNECTIONS",
        &or_default("PRICESYNC_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_value(
        "PRICESYNC_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("PRICESYNC_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let paapi_host = or_default("PAAPI_HOST", "webservices.amazon.com");
    let paapi_region = or_default("PAAPI_REGION", "us-east-1");
    let paapi_marketplace = or_default("PAAPI_MARKETPLACE", "www.amazon.com");
    let paapi_endpoint = lookup("PAAPI_ENDPOINT")
        .unwrap_or_else(|_| format!("https://{paapi_host}"))
        .trim_end_matches('/')
        .to_string();

    let batch_size: usize = parse_value(
        "PRICESYNC_BATCH_SIZE",
        &or_default("PRICESYNC_BATCH_SIZE", "10"),
    )?;
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let inter_batch_delay_ms = parse_value(
        "PRICESYNC_INTER_BATCH_DELAY_MS",
        &or_default("PRICESYNC_INTER_BATCH_DELAY_MS", "1500"),
    )?;
    let request_timeout_secs: u64 = parse_value(
        "PRICESYNC_REQUEST_TIMEOUT_SECS",
        &or_default("PRICESYNC_REQUEST_TIMEOUT_SECS", "30"),
    )?;
    if request_timeout_secs == 0 {
        return Err(invalid("PRICESYNC_REQUEST_TIMEOUT_SECS", "must be greater than zero"));
    }
    let retry_max_attempts: u32 = parse_value(
        "PRICESYNC_RETRY_MAX_ATTEMPTS",
        &or_default("PRICESYNC_RETRY_MAX_ATTEMPTS", "3"),
    )?;
    if retry_max_attempts == 0 {
        return Err(invalid("PRICESYNC_RETRY_MAX_ATTEMPTS", "must be at least 1"));
    }
    let retry_backoff_ms = parse_value(
        "PRICESYNC_RETRY_BACKOFF_MS",
        &or_default("PRICESYNC_RETRY_BACKOFF_MS", "2000"),
    )?;

    let anomaly_threshold_pct: Decimal = parse_value(
        "PRICESYNC_ANOMALY_THRESHOLD_PCT",
        &or_default("PRICESYNC_ANOMALY_THRESHOLD_PCT", "20"),
    )?;
    if anomaly_threshold_pct <= Decimal::ZERO {
        return Err(invalid("PRICESYNC_ANOMALY_THRESHOLD_PCT", "must be positive"));
    }
    let anomaly_recheck_delay_secs = parse_value(
        "PRICESYNC_ANOMALY_RECHECK_DELAY_SECS",
        &or_default("PRICESYNC_ANOMALY_RECHECK_DELAY_SECS", "60"),
    )?;
    let significant_drop_ratio: Decimal = parse_value(
        "PRICESYNC_SIGNIFICANT_DROP_RATIO",
        &or_default("PRICESYNC_SIGNIFICANT_DROP_RATIO", "0.98"),
    )?;
    if significant_drop_ratio <= Decimal::ZERO || significant_drop_ratio > Decimal::ONE {
        return Err(invalid(
            "PRICESYNC_SIGNIFICANT_DROP_RATIO",
            "must be in (0, 1]",
        ));
    }
    let min_discount_pct = parse_value(
        "PRICESYNC_MIN_DISCOUNT_PCT",
        &or_default("PRICESYNC_MIN_DISCOUNT_PCT", "5"),
    )?;
    let excluded_merchants = parse_list(&or_default("PRICESYNC_EXCLUDED_MERCHANTS", ""));

    let stale_after_hours: i64 = parse_value(
        "PRICESYNC_STALE_AFTER_HOURS",
        &or_default("PRICESYNC_STALE_AFTER_HOURS", "24"),
    )?;
    let scan_limit: i64 = parse_value(
        "PRICESYNC_SCAN_LIMIT",
        &or_default("PRICESYNC_SCAN_LIMIT", "500"),
    )?;
    if scan_limit <= 0 {
        return Err(invalid("PRICESYNC_SCAN_LIMIT", "must be positive"));
    }
    let day_offset_minutes: i32 = parse_value(
        "PRICESYNC_DAY_UTC_OFFSET_MINUTES",
        &or_default("PRICESYNC_DAY_UTC_OFFSET_MINUTES", "0"),
    )?;
    let day_policy = DayPolicy::with_offset_minutes(day_offset_minutes)
        .ok_or_else(|| invalid("PRICESYNC_DAY_UTC_OFFSET_MINUTES", "offset out of range"))?;
    let schedule_cron = or_default("PRICESYNC_SCHEDULE_CRON", "0 0 */6 * * *");

    let scrape_fallback_enabled = parse_bool(
        "SCRAPE_FALLBACK_ENABLED",
        &or_default("SCRAPE_FALLBACK_ENABLED", "true"),
    )?;
    let browser_fallback_enabled = parse_bool(
        "BROWSER_FALLBACK_ENABLED",
        &or_default("BROWSER_FALLBACK_ENABLED", "false"),
    )?;
    let scrape_base_url = or_default("SCRAPE_BASE_URL", "https://www.amazon.com")
        .trim_end_matches('/')
        .to_string();
    let browser_webdriver_url = or_default("BROWSER_WEBDRIVER_URL", "http://localhost:9515")
        .trim_end_matches('/')
        .to_string();

    let queue = match lookup("QUEUE_URL").ok().filter(|u| !u.trim().is_empty()) {
        None => None,
        Some(url) => {
            let endpoint = match lookup("QUEUE_ENDPOINT") {
                Ok(e) => e.trim_end_matches('/').to_string(),
                Err(_) => url_origin(&url)
                    .ok_or_else(|| invalid("QUEUE_URL", "expected an absolute http(s) URL"))?,
            };
            let max_messages: u32 =
                parse_value("QUEUE_MAX_MESSAGES", &or_default("QUEUE_MAX_MESSAGES", "10"))?;
            Some(QueueConfig {
                endpoint,
                region: or_default("QUEUE_REGION", "us-east-1"),
                access_key: lookup("QUEUE_ACCESS_KEY").unwrap_or_else(|_| paapi_access_key.clone()),
                secret_key: lookup("QUEUE_SECRET_KEY").unwrap_or_else(|_| paapi_secret_key.clone()),
                max_messages: max_messages.clamp(1, MAX_QUEUE_MESSAGES),
                wait_time_secs: parse_value(
                    "QUEUE_WAIT_TIME_SECS",
                    &or_default("QUEUE_WAIT_TIME_SECS", "20"),
                )?,
                url,
            })
        }
    };

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        paapi_access_key,
        paapi_secret_key,
        paapi_partner_tag,
        paapi_host,
        paapi_region,
        paapi_marketplace,
        paapi_endpoint,
        batch_size,
        inter_batch_delay_ms,
        request_timeout_secs,
        retry_max_attempts,
        retry_backoff_ms,
        anomaly_threshold_pct,
        anomaly_recheck_delay_secs,
        significant_drop_ratio,
        min_discount_pct,
        excluded_merchants,
        stale_after_hours,
        scan_limit,
        day_policy,
        schedule_cron,
        scrape_fallback_enabled,
        browser_fallback_enabled,
        scrape_base_url,
        browser_webdriver_url,
        queue,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICESYNC_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// Comma-separated list, entries trimmed, empties dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `scheme://host[:port]` of an absolute URL.
fn url_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let authority = rest.split('/').next().filter(|a| !a.is_empty())?;
    Some(format!("{scheme}://{authority}"))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
