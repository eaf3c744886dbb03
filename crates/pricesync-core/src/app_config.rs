use std::time::Duration;

use rust_decimal::Decimal;

use crate::calendar::DayPolicy;
use crate::retry::RetryPolicy;
use crate::trend::TrendPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Connection settings for the work queue. Absent when `QUEUE_URL` is unset.
#[derive(Clone)]
pub struct QueueConfig {
    pub url: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub max_messages: u32,
    pub wait_time_secs: u32,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("url", &self.url)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &"[redacted]")
            .field("secret_key", &"[redacted]")
            .field("max_messages", &self.max_messages)
            .field("wait_time_secs", &self.wait_time_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub paapi_access_key: String,
    pub paapi_secret_key: String,
    pub paapi_partner_tag: String,
    pub paapi_host: String,
    pub paapi_region: String,
    pub paapi_marketplace: String,
    pub paapi_endpoint: String,

    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub anomaly_threshold_pct: Decimal,
    pub anomaly_recheck_delay_secs: u64,
    pub significant_drop_ratio: Decimal,
    pub min_discount_pct: u32,
    pub excluded_merchants: Vec<String>,
    pub stale_after_hours: i64,
    pub scan_limit: i64,
    pub day_policy: DayPolicy,
    pub schedule_cron: String,

    pub scrape_fallback_enabled: bool,
    pub browser_fallback_enabled: bool,
    pub scrape_base_url: String,
    pub browser_webdriver_url: String,

    pub queue: Option<QueueConfig>,
}

impl AppConfig {
    /// Linear back-off retry policy shared by every outbound client.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    #[must_use]
    pub fn trend_policy(&self) -> TrendPolicy {
        TrendPolicy {
            significant_drop_ratio: self.significant_drop_ratio,
            min_discount_percent: self.min_discount_pct,
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    #[must_use]
    pub fn anomaly_recheck_delay(&self) -> Duration {
        Duration::from_secs(self.anomaly_recheck_delay_secs)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("paapi_access_key", &"[redacted]")
            .field("paapi_secret_key", &"[redacted]")
            .field("paapi_partner_tag", &self.paapi_partner_tag)
            .field("paapi_host", &self.paapi_host)
            .field("paapi_region", &self.paapi_region)
            .field("paapi_marketplace", &self.paapi_marketplace)
            .field("paapi_endpoint", &self.paapi_endpoint)
            .field("batch_size", &self.batch_size)
            .field("inter_batch_delay_ms", &self.inter_batch_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("anomaly_threshold_pct", &self.anomaly_threshold_pct)
            .field(
                "anomaly_recheck_delay_secs",
                &self.anomaly_recheck_delay_secs,
            )
            .field("significant_drop_ratio", &self.significant_drop_ratio)
            .field("min_discount_pct", &self.min_discount_pct)
            .field("excluded_merchants", &self.excluded_merchants)
            .field("stale_after_hours", &self.stale_after_hours)
            .field("scan_limit", &self.scan_limit)
            .field("day_policy", &self.day_policy)
            .field("schedule_cron", &self.schedule_cron)
            .field("scrape_fallback_enabled", &self.scrape_fallback_enabled)
            .field("browser_fallback_enabled", &self.browser_fallback_enabled)
            .field("scrape_base_url", &self.scrape_base_url)
            .field("browser_webdriver_url", &self.browser_webdriver_url)
            .field("queue", &self.queue)
            .finish()
    }
}
