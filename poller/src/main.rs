mod app;
mod coordinator;
mod model;
mod source;
mod store;
#[cfg(test)]
mod testutil;
mod worker;

use clap::{Parser, Subcommand};
use poller_core::{telemetry, Config};
use sqlx::postgres::PgPoolOptions;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[clap(name = "poller")]
#[clap(about = "Ledger history ingestion poller", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,

    /// Run the continuous poll loop
    Run {
        /// Override the start position for streams without a stored cursor
        #[clap(long, env = "POLLER_START_POSITION")]
        start: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.connect_timeout_secs,
        ))
        .idle_timeout(std::time::Duration::from_secs(
            config.database.idle_timeout_secs,
        ))
        .connect(&config.database.url)
        .await?;

    match cli.command {
        Commands::Migrate => {
            info!("Running database migrations");
            sqlx::migrate!("../migrations").run(&pool).await?;
            info!("Migrations completed successfully");
        }

        Commands::Run { start } => {
            if let Some(start) = start {
                for stream in &mut config.poller.streams {
                    stream.start_position = start;
                }
            }

            info!(
                streams = config.poller.streams.len(),
                floor_secs = config.poller.cycle_floor_secs,
                "Starting poller"
            );

            let app = app::App::new(config, pool).await?;
            app.run().await?;
        }
    }

    telemetry::shutdown();
    Ok(())
}
