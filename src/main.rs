use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod api;
mod app;
mod classifier;
mod classify;
mod config;
mod dedup;
mod domain;
mod error;
mod geo;
mod llm;
mod models;
mod normalize;
mod notify;
mod patterns;
mod pipeline;
mod processor;
mod queries;
mod scoring;
mod search;
mod sheets;
mod store;

use app::{AppState, DiscoverParams};
use classify::TargetArea;
use config::{AppArgs, Config, build_config};
use models::{ClientStatus, LeadCandidate};
use pipeline::DiscoveryOutcome;
use store::{ClientFilter, ClientStore, JsonClientStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: AppArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the web for diesel buyers in a target area
    Discover {
        /// Target area (all, pantai-timur, utara, tengah, selatan, sabah, sarawak)
        #[arg(short, long, default_value = "pantai-timur")]
        area: TargetArea,

        /// Run this query instead of picking from the query bank
        #[arg(short, long)]
        query: Option<String>,

        /// Write the qualified candidates to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one unattended discovery with a random nationwide query
    Scheduled {
        /// Write the qualified candidates to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import candidates from a JSON file into the client store
    Import {
        /// Path to a JSON array of candidates, as written by `discover --output`
        #[arg(short, long)]
        input: PathBuf,
    },
    /// List clients
    Clients {
        /// Show archived clients instead of active ones
        #[arg(long)]
        archived: bool,
    },
    /// Archive clients by id
    Archive { ids: Vec<Uuid> },
    /// Restore archived clients by id
    Restore { ids: Vec<Uuid> },
    /// Permanently delete clients by id
    Delete { ids: Vec<Uuid> },
    /// Set the status of clients
    Status {
        #[arg(value_enum)]
        status: StatusArg,
        ids: Vec<Uuid>,
    },
    /// Export active clients to the configured Google spreadsheet
    SyncSheets,
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum StatusArg {
    New,
    Potential,
    Active,
}

impl From<StatusArg> for ClientStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::New => ClientStatus::New,
            StatusArg::Potential => ClientStatus::Potential,
            StatusArg::Active => ClientStatus::Active,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(build_config(&cli.args)?);

    match cli.command {
        Commands::Discover {
            area,
            query,
            output,
            json,
        } => {
            let state = AppState::from_config(config, true).await?;
            let outcome = state
                .discover(DiscoverParams {
                    area: Some(area),
                    custom_query: query,
                    ..Default::default()
                })
                .await?;
            report_outcome(&outcome, output.as_deref(), json).await?;
        }
        Commands::Scheduled { output } => {
            let state = AppState::from_config(config, false).await?;
            let outcome = state.scheduled().await?;
            report_outcome(&outcome, output.as_deref(), false).await?;
        }
        Commands::Import { input } => {
            let data = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let candidates: Vec<LeadCandidate> = serde_json::from_str(&data)
                .with_context(|| format!("{} is not a JSON array of candidates", input.display()))?;
            info!("Loaded {} candidates from {}", candidates.len(), input.display());

            let store = open_store(&config).await?;
            let summary =
                store::import_candidates(&store, config.owner.as_deref(), &candidates).await?;
            println!("{}", summary);
        }
        Commands::Clients { archived } => {
            let store = open_store(&config).await?;
            let filter = ClientFilter {
                archived: Some(archived),
                owner: config.owner.clone(),
            };
            let clients = store.list(&filter).await?;
            for c in &clients {
                println!(
                    "{}  {:<40} {:<14} {:>7} L  {:?}/{:?}",
                    c.id,
                    c.company_name,
                    c.state.label(),
                    c.estimated_usage,
                    c.priority,
                    c.status
                );
            }
            println!("{} clients", clients.len());
        }
        Commands::Archive { ids } => {
            let changed = open_store(&config).await?.archive(&ids).await?;
            println!("Archived {} clients", changed);
        }
        Commands::Restore { ids } => {
            let changed = open_store(&config).await?.restore(&ids).await?;
            println!("Restored {} clients", changed);
        }
        Commands::Delete { ids } => {
            let changed = open_store(&config).await?.delete(&ids).await?;
            println!("Deleted {} clients", changed);
        }
        Commands::Status { status, ids } => {
            let changed = open_store(&config)
                .await?
                .update_status(&ids, status.into())
                .await?;
            println!("Updated {} clients", changed);
        }
        Commands::SyncSheets => {
            let state = AppState::from_config(config, false).await?;
            let report = state.sync_sheets(None).await?;
            println!(
                "Synced {} rows ({} cells) to Google Sheets",
                report.rows_written, report.updated_cells
            );
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.api_port);
            let state = AppState::from_config(config, false).await?;
            api::start_api_server(Arc::new(state), port).await;
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<JsonClientStore> {
    JsonClientStore::open(&config.store_file)
        .await
        .with_context(|| format!("Failed to open client store {}", config.store_file.display()))
}

async fn report_outcome(
    outcome: &DiscoveryOutcome,
    output: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        if let DiscoveryOutcome::Completed(report) = outcome {
            if let Some(summary) = &report.summary {
                println!("{}", summary);
            }
            for lead in &report.candidates {
                println!(
                    "[{:>3}] {:<40} {:<16} {:<14} {:>7} L/month",
                    lead.quality_score,
                    lead.company_name,
                    lead.industry,
                    lead.location,
                    lead.estimated_usage
                );
            }
        }
        println!("{}", outcome.message());
    }

    if let Some(path) = output {
        let data = serde_json::to_string_pretty(outcome.candidates())?;
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} candidates to {}", outcome.candidates().len(), path.display());
    }
    Ok(())
}
