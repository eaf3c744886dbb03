//! The price synchronization loop: batch fetch, fallback recovery, anomaly
//! reconciliation, history and trend, and the queue consumer that feeds it.

pub mod adapters;
pub mod consumer;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod ports;

#[cfg(test)]
mod testing;

pub use adapters::PgCatalog;
pub use consumer::{parse_identifier, DrainMode, QueueConsumer};
pub use error::SyncError;
pub use orchestrator::{OrchestratorSettings, SyncOrchestrator, SyncState};
pub use outcome::{AnomalyResolution, ListingOutcome, PriceOrigin, RunSummary, SoftFailure};
pub use ports::{CatalogStore, FallbackSource, PriceSource, WorkQueue};
