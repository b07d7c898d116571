use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use vigie::config::AppConfig;
use vigie::models::CatalogReference;
use vigie::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "vigie", about = "Catalog price collection across retailer websites")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Collect prices for every reference in a catalog file.
    Run {
        /// Catalog file: one reference per line, '#' comments allowed.
        catalog: PathBuf,

        /// Restrict the run to a single configured vendor.
        #[arg(long)]
        vendor: Option<String>,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigie=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let Command::Run { catalog, vendor, data_dir } = cli.command;

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(data_dir) = data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(vendor) = &vendor {
        let known = config.vendors.iter().any(|v| &v.name == vendor);
        anyhow::ensure!(known, "unknown vendor '{vendor}'");
        for v in &mut config.vendors {
            v.enabled = Some(&v.name == vendor);
        }
    }

    let catalog = read_catalog(&catalog)
        .with_context(|| format!("failed to read catalog {}", catalog.display()))?;
    anyhow::ensure!(!catalog.is_empty(), "catalog is empty");
    info!(references = catalog.len(), "loaded catalog");

    let orchestrator = Orchestrator::new(config).with_progress(Box::new(|percent| {
        info!(percent, "progress");
    }));

    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current item then stopping");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let summary = orchestrator.run(&catalog).await?;

    for outcome in &summary.vendors {
        info!(
            vendor = %outcome.vendor,
            fresh = outcome.fresh,
            cached = outcome.cached,
            unavailable = outcome.unavailable,
            failed = outcome.failed,
            "vendor outcome"
        );
    }
    match &summary.export_path {
        Some(path) => info!(
            records = summary.total_records,
            export = %path.display(),
            "run complete"
        ),
        None => info!(records = summary.total_records, "run complete, nothing to export"),
    }
    if summary.cancelled {
        warn!("run was cancelled before completion");
    }

    Ok(())
}

fn read_catalog(path: &PathBuf) -> Result<Vec<CatalogReference>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
