//! Captrend - compacts storage capacity trend collections

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use captrend::clock::SystemClock;
use captrend::config::Config;
use captrend::error::Result;
use captrend::pipeline::{CompactionRun, RunOptions, RunReport};
use captrend::storage::LanceStore;

/// Captrend - thins capacity trend collections to their meaningful points
#[derive(Parser)]
#[command(name = "captrend")]
#[command(about = "Compact storage capacity trends with a two-tier retention policy")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compact one collection and audit every deletion
    Compact {
        /// Collection to compact (default from config)
        #[arg(long)]
        collection: Option<String>,

        /// Compute the plan without deleting anything
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Override the database directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Compact {
            collection,
            dry_run,
            json,
            data_dir,
        } => compact(cli.config, collection, dry_run, json, data_dir).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,captrend=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn compact(
    config_path: Option<PathBuf>,
    collection: Option<String>,
    dry_run: bool,
    json: bool,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    config.validate()?;

    tracing::info!("Opening database at: {}", config.storage.data_dir.display());
    let store = LanceStore::connect(&config.storage.data_dir).await?;
    let clock = SystemClock;

    let options = RunOptions::from_config(&config, collection.as_deref());
    let run = CompactionRun::new(&store, &clock, options);

    let report = if dry_run {
        run.preview().await?
    } else {
        let mut sink = store.audit_sink(&config.audit.table).await?;
        run.execute(&mut sink).await?
    };

    print_report(&report, json)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let output = serde_json::to_string_pretty(report)
            .map_err(|e| captrend::CaptrendError::Serialization(e.to_string()))?;
        println!("{output}");
        return Ok(());
    }

    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Compaction of '{}'{}", report.collection, mode);
    println!("  Run id:      {}", report.run_id);
    println!("  Cutoff:      {}", report.cutoff);
    println!(
        "  Loaded:      {} of {} ({} skipped)",
        report.loaded, report.fetched, report.skipped
    );
    println!("  Kept:        {}", report.kept);
    println!("  To delete:   {}", report.planned_deletions);
    if !report.dry_run {
        println!("  Deleted:     {}", report.deleted);
        println!("  Failed:      {}", report.failed);
        println!(
            "  Audited:     {} records in {} batches",
            report.audit_records, report.audit_batches
        );
    }
    Ok(())
}
