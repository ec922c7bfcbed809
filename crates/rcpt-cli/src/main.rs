//! CLI application for receipt ingestion.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{config, file, ingest, receipts};

/// Receipt ingestion - validate, recognize and parse scanned receipts
#[derive(Parser)]
#[command(name = "rcpt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload, validate and process files matching a pattern
    Ingest(ingest::IngestArgs),

    /// Step through the lifecycle of a single tracked file
    File(file::FileArgs),

    /// Query stored receipt records
    Receipts(receipts::ReceiptsArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Verbosity flags set the default; RUST_LOG overrides
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ingest(args) => ingest::run(args, config_path).await,
        Commands::File(args) => file::run(args, config_path).await,
        Commands::Receipts(args) => receipts::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
