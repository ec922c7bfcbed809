//! Subcommands of the `rcpt` binary.

pub mod config;
mod context;
pub mod file;
pub mod ingest;
pub mod receipts;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}
