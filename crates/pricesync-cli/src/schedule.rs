//! Recurring stale scan driven by `tokio-cron-scheduler`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pricesync_core::AppConfig;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::sync::{execute, Work};

/// Registers the scan job, starts the scheduler and blocks until Ctrl-C.
///
/// A tick that fires while the previous scan is still running is skipped.
pub(crate) async fn run_schedule(pool: PgPool, config: AppConfig) -> anyhow::Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut scheduler = build_scheduler(pool, config, Arc::clone(&cancel)).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("scheduler: ctrl-c received; shutting down");
    cancel.store(true, Ordering::SeqCst);
    scheduler.shutdown().await?;
    Ok(())
}

/// Builds and starts the scheduler. The returned handle must stay alive;
/// dropping it stops the job.
async fn build_scheduler(
    pool: PgPool,
    config: AppConfig,
    cancel: Arc<AtomicBool>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let cron = config.schedule_cron.clone();
    let pool = Arc::new(pool);
    let config = Arc::new(config);
    let running = Arc::new(Mutex::new(()));

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);
        let running = Arc::clone(&running);
        let cancel = Arc::clone(&cancel);

        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                tracing::warn!("scheduler: previous scan still running; skipping tick");
                return;
            };
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            tracing::info!("scheduler: starting stale scan");
            match execute(&pool, &config, Work::Scan, cancel).await {
                Ok(summary) => tracing::info!(
                    seen = summary.seen,
                    committed = summary.committed(),
                    "scheduler: stale scan complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: stale scan failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(cron = %cron, "scheduler: started");
    Ok(scheduler)
}
