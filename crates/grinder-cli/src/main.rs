use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grinder_sync::{Config, RunMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grinder-etl")]
#[command(about = "CSV report importers for tournament results and sharkbot stats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download today's tournament report and import rows dated today.
    Tournaments {
        /// Import an already-downloaded file instead: no download, no date
        /// filter, stricter required fields.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Download today's sharkbot stats and import rows dated today.
    Sharkbot {
        /// Import an already-downloaded file instead (no download, no date filter).
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Run both pipelines on their cron schedules until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Tournaments { file } => {
            let mode = match file {
                Some(path) => {
                    config.tournaments_file = path;
                    RunMode::Offline
                }
                None => RunMode::Download,
            };
            let summary = grinder_sync::run_tournaments(&config, mode).await?;
            println!("tournament import complete: {}", summary.report.summary());
        }
        Commands::Sharkbot { file } => {
            let mode = match file {
                Some(path) => {
                    config.sharkbot_file = path;
                    RunMode::Offline
                }
                None => RunMode::Download,
            };
            let summary = grinder_sync::run_sharkbot(&config, mode).await?;
            println!("sharkbot import complete: {}", summary.report.summary());
        }
        Commands::Schedule => {
            let sched = grinder_sync::build_scheduler(config).await?;
            sched.start().await.context("starting scheduler")?;
            info!("scheduler running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        }
    }

    Ok(())
}
