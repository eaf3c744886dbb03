mod schedule;
mod sync;
mod trend;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "pricesync")]
#[command(about = "Marketplace price synchronization engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one sync pass
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Run the stale scan on the configured cron schedule until Ctrl-C
    Schedule {
        /// Override `PRICESYNC_SCHEDULE_CRON`
        #[arg(long)]
        cron: Option<String>,
    },
    /// Print the current trend signals for one listing as JSON
    Trend {
        /// Marketplace identifier of the listing
        identifier: String,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("pricesync: no command given; see --help");
        return Ok(());
    };

    let config = pricesync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = pricesync_db::PoolConfig::from_app_config(&config);
    let pool = pricesync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            pricesync_db::ping(&pool).await?;
            println!("database: ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = pricesync_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Sync { command } => sync::run_sync_command(&pool, config, command).await?,
        Commands::Schedule { cron } => {
            let mut config = config;
            if let Some(cron) = cron {
                config.schedule_cron = cron;
            }
            schedule::run_schedule(pool, config).await?;
        }
        Commands::Trend { identifier } => trend::print_trend(&pool, &config, &identifier).await?,
    }

    Ok(())
}
