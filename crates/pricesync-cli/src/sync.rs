//! `sync` command handlers and the shared run wrapper used by the
//! scheduler.
//!
//! Every pass is recorded as a `sync_runs` row (queued → running →
//! succeeded/failed). Per-listing failures never fail the run; only
//! infrastructure errors do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Subcommand;
use pricesync_aws::{Credentials, QueueClient};
use pricesync_core::{AppConfig, SyncReason};
use pricesync_paapi::{MerchantPolicy, PaapiClient, PaapiSettings};
use pricesync_scraper::{FallbackConfig, ScrapeFallbackChain};
use pricesync_sync::{
    DrainMode, OrchestratorSettings, PgCatalog, QueueConsumer, RunSummary, SyncOrchestrator,
};
use tracing::Instrument;

/// Sub-commands available under `sync`.
#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Refresh listings not synced within the stale window
    Scan {
        /// Override `PRICESYNC_SCAN_LIMIT`
        #[arg(long)]
        limit: Option<i64>,

        /// List the identifiers a scan would refresh without fetching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Refresh specific listings by marketplace identifier
    Ids {
        #[arg(required = true, num_args = 1..)]
        identifiers: Vec<String>,
    },
    /// Drain the refresh queue
    Queue {
        /// Override `QUEUE_MAX_MESSAGES` (1-10)
        #[arg(long)]
        max_messages: Option<u32>,

        /// Keep long-polling after the queue runs dry
        #[arg(long)]
        follow: bool,
    },
}

/// What a tracked run should process.
#[derive(Debug, Clone)]
pub(crate) enum Work {
    Scan,
    Ids(Vec<String>),
    Queue(DrainMode),
}

impl Work {
    fn trigger(&self) -> SyncReason {
        match self {
            Work::Scan => SyncReason::Scan,
            Work::Ids(_) => SyncReason::Manual,
            Work::Queue(_) => SyncReason::Queue,
        }
    }
}

pub(crate) async fn run_sync_command(
    pool: &sqlx::PgPool,
    mut config: AppConfig,
    command: SyncCommands,
) -> anyhow::Result<()> {
    let work = match command {
        SyncCommands::Scan { limit, dry_run } => {
            if let Some(limit) = limit {
                config.scan_limit = limit.max(1);
            }
            if dry_run {
                return print_dry_run(pool, &config).await;
            }
            Work::Scan
        }
        SyncCommands::Ids { identifiers } => Work::Ids(identifiers),
        SyncCommands::Queue {
            max_messages,
            follow,
        } => {
            let Some(queue) = config.queue.as_mut() else {
                anyhow::bail!("QUEUE_URL is not set; queue mode is disabled");
            };
            if let Some(n) = max_messages {
                queue.max_messages = n.clamp(1, pricesync_core::config::MAX_QUEUE_MESSAGES);
            }
            Work::Queue(if follow {
                DrainMode::Forever
            } else {
                DrainMode::UntilEmpty
            })
        }
    };

    let summary = execute(pool, &config, work, cancel_on_ctrl_c()).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn print_dry_run(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let stale_before = chrono::Utc::now() - chrono::Duration::hours(config.stale_after_hours);
    let listings = pricesync_db::list_stale_listings(pool, stale_before, config.scan_limit).await?;
    let ids: Vec<&str> = listings.iter().map(|l| l.external_id.as_str()).collect();
    println!(
        "dry-run: would sync {} listings: [{}]",
        ids.len(),
        ids.join(", ")
    );
    Ok(())
}

/// A [`Work`] item with its clients built.
enum Pass {
    Scan,
    Ids(Vec<String>),
    Queue(QueueConsumer<QueueClient>),
}

/// Runs one tracked pass and records its outcome on the `sync_runs` row.
pub(crate) async fn execute(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    work: Work,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<RunSummary> {
    // Client construction errors are configuration problems; surface them
    // before a run row exists.
    let source = build_paapi_client(config)?;
    let fallback = build_fallback(config)?;
    let trigger = work.trigger();
    let pass = match work {
        Work::Scan => Pass::Scan,
        Work::Ids(ids) => Pass::Ids(ids),
        Work::Queue(mode) => Pass::Queue(QueueConsumer::new(build_queue_client(config)?, mode)),
    };

    let run = pricesync_db::create_sync_run(pool, trigger).await?;
    pricesync_db::start_sync_run(pool, run.id).await?;

    let span = tracing::info_span!("sync_run", run_id = %run.public_id, %trigger);
    async move {
        tracing::info!("sync run started");
        let store = PgCatalog::new(pool.clone()).with_sync_run(run.id);
        let mut orchestrator = SyncOrchestrator::new(
            source,
            fallback,
            store,
            OrchestratorSettings::from_app_config(config),
        )
        .with_cancellation(cancel);

        let result = match pass {
            Pass::Scan => orchestrator.run_scan().await,
            Pass::Ids(ids) => orchestrator.run_ids(&ids).await,
            Pass::Queue(consumer) => consumer.drain(&mut orchestrator).await,
        };

        match result {
            Ok(summary) => {
                summary.log(&run.public_id.to_string());
                if let Err(e) =
                    pricesync_db::complete_sync_run(pool, run.id, summary.to_counts()).await
                {
                    fail_run_best_effort(pool, run.id, &format!("{e:#}")).await;
                    return Err(e.into());
                }
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "sync run aborted");
                fail_run_best_effort(pool, run.id, &format!("{e:#}")).await;
                Err(e.into())
            }
        }
    }
    .instrument(span)
    .await
}

async fn fail_run_best_effort(pool: &sqlx::PgPool, run_id: i64, message: &str) {
    if let Err(mark_err) =
        pricesync_db::fail_sync_run(pool, run_id, message, pricesync_db::SyncRunCounts::default())
            .await
    {
        tracing::error!(run_id, error = %mark_err, "failed to mark sync run as failed");
    }
}

pub(crate) fn build_paapi_client(config: &AppConfig) -> anyhow::Result<PaapiClient> {
    let settings = PaapiSettings {
        endpoint: config.paapi_endpoint.clone(),
        host: config.paapi_host.clone(),
        region: config.paapi_region.clone(),
        marketplace: config.paapi_marketplace.clone(),
        partner_tag: config.paapi_partner_tag.clone(),
        batch_size: config.batch_size,
    };
    let client = PaapiClient::new(
        settings,
        Credentials::new(&config.paapi_access_key, &config.paapi_secret_key),
        config.request_timeout(),
        config.retry_policy(),
        MerchantPolicy::new(&config.excluded_merchants),
    )?;
    Ok(client)
}

pub(crate) fn build_fallback(config: &AppConfig) -> anyhow::Result<ScrapeFallbackChain> {
    let chain = ScrapeFallbackChain::new(FallbackConfig {
        scrape_enabled: config.scrape_fallback_enabled,
        browser_enabled: config.browser_fallback_enabled,
        base_url: config.scrape_base_url.clone(),
        webdriver_url: config.browser_webdriver_url.clone(),
        timeout: config.request_timeout(),
        retry: config.retry_policy(),
    })?;
    Ok(chain)
}

fn build_queue_client(config: &AppConfig) -> anyhow::Result<QueueClient> {
    let Some(queue) = &config.queue else {
        anyhow::bail!("QUEUE_URL is not set; queue mode is disabled");
    };
    let client = QueueClient::new(
        &queue.endpoint,
        &queue.url,
        &queue.region,
        Credentials::new(&queue.access_key, &queue.secret_key),
        queue.max_messages,
        queue.wait_time_secs,
        config.request_timeout(),
        config.retry_policy(),
    )?;
    Ok(client)
}

/// A flag set on the first Ctrl-C. The orchestrator checks it between
/// listings, so the listing in flight still completes.
pub(crate) fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("ctrl-c received; stopping after the current listing");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}
