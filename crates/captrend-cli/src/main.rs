use std::path::PathBuf;

use captrend::config::Config;
use captrend::storage::LanceStore;
use captrend_cli::commands::{AuditCommand, PlanCommand, StatsCommand};
use captrend_cli::error::CliResult;
use captrend_cli::output::OutputFormat;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "captrend-cli")]
#[command(about = "Captrend CLI - Read-only inspection of capacity collections and the deletion log")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show per-series observation statistics")]
    Stats(StatsCommand),

    #[clap(about = "Show what a compaction would keep and delete")]
    Plan(PlanCommand),

    #[clap(about = "List the deletion log")]
    Audit(AuditCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir.clone() {
        config.storage.data_dir = dir;
    }
    config.validate()?;

    let store = LanceStore::connect(&config.storage.data_dir).await?;

    match &cli.command {
        Command::Stats(cmd) => cmd.execute(&store, &config.storage.collection, format).await,
        Command::Plan(cmd) => cmd.execute(&store, &config, format).await,
        Command::Audit(cmd) => cmd.execute(&store, &config.audit.table, format).await,
    }
}

/// Library logs go to stderr and stay quiet unless RUST_LOG asks otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
