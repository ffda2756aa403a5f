mod cli;
mod config;
mod db;
mod error;
mod fetch;
mod models;
mod pipeline;
mod resolver;
mod sources;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::IngestConfig;

#[derive(Parser)]
#[command(name = "sportsync")]
#[command(about = "Multi-source sports data ingestion into a local SQLite store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    InitDb,
    /// Pull data from one or more sources
    Update {
        /// Comma-separated source names, or "all"
        #[arg(short, long, value_delimiter = ',', default_value = "all")]
        sources: Vec<String>,
        /// Refresh everything instead of an incremental run
        #[arg(long, conflicts_with = "since")]
        full: bool,
        /// Only records on or after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        since: Option<NaiveDate>,
    },
    /// List registered sources
    Sources,
    /// Show stored matches
    Matches {
        /// League name; repeat or comma-separate for several
        #[arg(short, long, value_delimiter = ',')]
        league: Vec<String>,
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
    },
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    utils::parse_date(raw).ok_or_else(|| format!("expected YYYY-MM-DD, got {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sportsync=info")))
        .init();

    let cli = Cli::parse();
    let config = IngestConfig::from_env();

    match cli.command {
        Commands::InitDb => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        Commands::Update { sources, full, since } => {
            let mode = cli::run_mode(full, since, &config);
            tracing::info!("Updating {:?} in {} mode", sources, mode);
            if !cli::update(&config, &sources, mode).await? {
                std::process::exit(1);
            }
        }
        Commands::Sources => {
            cli::list_sources(&config)?;
        }
        Commands::Matches { league, from, to } => {
            cli::show_matches(&config, &league, from, to).await?;
        }
    }

    Ok(())
}
