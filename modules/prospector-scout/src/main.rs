use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use prospector_common::config::load_config;
use prospector_common::{AppConfig, FundingStage};
use prospector_scout::{Discovery, RunError};
use prospector_store::{CandidateQuery, PgCandidateStore, SortKey};

#[derive(Parser)]
#[command(name = "prospector", about = "Discover, deduplicate and score candidate organizations")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch from every configured source, resolve, score and commit.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print stored candidates matching the filters as JSON.
    Query {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        min_authenticity: Option<f64>,
        #[arg(long)]
        min_fit: Option<f64>,
        #[arg(long)]
        healthcare_only: bool,
        #[arg(long)]
        location: Option<String>,
        /// Substring of the name, an alias or a description.
        #[arg(long)]
        text: Option<String>,
        /// Funding stage label, e.g. "series a". Repeatable.
        #[arg(long = "stage")]
        stages: Vec<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Authenticity)]
        sort: SortArg,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Summarize the discovery runs of the last N days.
    Stats {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Delete run records older than the retention window.
    Prune {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Authenticity,
    Fit,
}

impl From<SortArg> for SortKey {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Authenticity => SortKey::Authenticity,
            SortArg::Fit => SortKey::Fit,
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("prospector=info".parse()?);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn discovery(config: &Path) -> Result<Discovery> {
    let config = load_config(config)?;
    let app = AppConfig::from_env()?;

    let store = PgCandidateStore::connect(&app.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    store.migrate().await.context("Failed to run migrations")?;

    Discovery::from_config(Arc::new(store), &config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Command::Run { config } => {
            info!("Prospector discovery run starting...");
            let discovery = discovery(&config).await?;
            match discovery.run_discovery().await {
                Ok(summary) => {
                    println!("{summary}");
                }
                Err(RunError::Persistence { summary, source }) => {
                    println!("{summary}");
                    return Err(source).context("Run commit rolled back");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Query {
            config,
            min_authenticity,
            min_fit,
            healthcare_only,
            location,
            text,
            stages,
            sort,
            offset,
            limit,
        } => {
            let mut funding_stages = std::collections::BTreeSet::new();
            for label in &stages {
                match FundingStage::parse(label) {
                    Some(stage) => {
                        funding_stages.insert(stage);
                    }
                    None => bail!("Unknown funding stage: {label}"),
                }
            }
            let query = CandidateQuery {
                min_authenticity,
                min_fit,
                healthcare_only,
                location_contains: location,
                text_contains: text,
                funding_stages,
                sort: sort.into(),
                offset,
                limit,
            };

            let discovery = discovery(&config).await?;
            let page = discovery.query_candidates(&query).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Stats { config, days } => {
            let discovery = discovery(&config).await?;
            let stats = discovery.run_stats(days).await?;
            println!("{stats}");
        }
        Command::Prune { config } => {
            let discovery = discovery(&config).await?;
            let removed = discovery.prune().await?;
            println!("Pruned {removed} discovery runs");
        }
    }

    Ok(())
}
