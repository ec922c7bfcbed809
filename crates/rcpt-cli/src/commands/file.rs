//! File command - drive one tracked file through its lifecycle.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use rcpt_core::models::receipt::FileId;
use rcpt_core::pipeline::ProcessOutcome;

use super::context::{load_config, open_pipeline};

/// Arguments for the file command.
#[derive(Args)]
pub struct FileArgs {
    #[command(subcommand)]
    command: FileCommand,
}

#[derive(Subcommand)]
enum FileCommand {
    /// Store a file and start tracking it
    Upload {
        /// File to upload
        path: PathBuf,
    },

    /// Validate a tracked file (runs once per file)
    Validate {
        /// Tracked file id
        id: i64,
    },

    /// Recognize and parse a validated file into a receipt record
    Process {
        /// Tracked file id
        id: i64,
    },

    /// Show a tracked file as JSON
    Show {
        /// Tracked file id
        id: i64,
    },
}

pub async fn run(args: FileArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pipeline = open_pipeline(&config)?;

    match args.command {
        FileCommand::Upload { path } => {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
            let data = fs::read(&path)?;
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("upload");
            let id = pipeline.upload(filename, &data)?;
            println!(
                "{} Uploaded {} as file {}",
                style("✓").green(),
                filename,
                id
            );
        }
        FileCommand::Validate { id } => {
            let id = FileId(id);
            let result = pipeline.validate(id)?;
            match result.reason {
                None => println!("{} File {} is valid", style("✓").green(), id),
                Some(reason) => println!(
                    "{} File {} is invalid: {} {}",
                    style("✗").red(),
                    id,
                    reason,
                    result.detail.as_deref().map(|d| format!("({})", d)).unwrap_or_default()
                ),
            }
        }
        FileCommand::Process { id } => {
            let outcome = pipeline.process(FileId(id)).await?;
            match &outcome {
                ProcessOutcome::Created { receipt_id, warnings } => {
                    println!(
                        "{} Created receipt {} from file {}",
                        style("✓").green(),
                        receipt_id,
                        id
                    );
                    for warning in warnings {
                        println!("  {} {}", style("⚠").yellow(), warning.code());
                    }
                }
                ProcessOutcome::AlreadyProcessed { receipt_id } => {
                    println!(
                        "{} File {} was already processed into receipt {}",
                        style("ℹ").blue(),
                        id,
                        receipt_id
                    );
                }
            }
        }
        FileCommand::Show { id } => {
            let file = pipeline.tracked_file(FileId(id))?;
            println!("{}", serde_json::to_string_pretty(&file)?);
        }
    }

    Ok(())
}
