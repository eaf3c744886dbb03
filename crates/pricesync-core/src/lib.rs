pub mod app_config;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod listings;
pub mod retry;
pub mod trend;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, QueueConfig};
pub use calendar::DayPolicy;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use ledger::{decide_append, AppendDecision, HistoryWindow};
pub use listings::{FetchStatus, FetchedPrice, Listing, PriceObservation, SyncJob, SyncReason};
pub use retry::{Backoff, RetryPolicy, Transient};
pub use trend::{TrendEngine, TrendPolicy, TrendSnapshot};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
