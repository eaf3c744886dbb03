use pricesync_aws::QueueError;
use pricesync_db::DbError;
use thiserror::Error;

/// Infrastructure failures. Any of these aborts the run; per-listing
/// problems are reported as [`crate::ListingOutcome`]s instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog store failure: {0}")]
    Store(#[from] DbError),

    #[error("work queue failure: {0}")]
    Queue(#[from] QueueError),
}
