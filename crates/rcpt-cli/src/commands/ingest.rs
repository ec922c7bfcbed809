//! Ingest command - upload, validate and process many files at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use rcpt_core::error::RcptError;
use rcpt_core::models::receipt::FileId;
use rcpt_core::pipeline::{IngestOutcome, IngestionPipeline, ProcessOutcome};

use super::context::{load_config, open_pipeline};

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Number of parallel extraction workers
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Write a per-file summary CSV to this path
    #[arg(long)]
    summary: Option<PathBuf>,
}

/// Result of ingesting a single file.
struct IngestResult {
    path: PathBuf,
    outcome: Option<IngestOutcome>,
    /// Tracked file left behind by a failure after upload.
    failed_file: Option<FileId>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: IngestArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.pipeline.workers = jobs;
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to ingest",
        style("ℹ").blue(),
        files.len()
    );

    let pipeline = Arc::new(open_pipeline(&config)?);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    // Extraction is bounded by the pipeline's worker pool
    let tasks: Vec<_> = files
        .into_iter()
        .map(|path| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let file_start = Instant::now();
                let result = ingest_file(&pipeline, &path).await;
                (path, result, file_start.elapsed().as_millis() as u64)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        let (path, result, processing_time_ms) = task.await?;
        match result {
            Ok(outcome) => results.push(IngestResult {
                path,
                outcome: Some(outcome),
                failed_file: None,
                error: None,
                processing_time_ms,
            }),
            Err(e) => {
                let failed_file = e.downcast_ref::<RcptError>().and_then(RcptError::file_id);
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to ingest {}: {}", path.display(), error_msg);
                    results.push(IngestResult {
                        path,
                        outcome: None,
                        failed_file,
                        error: Some(error_msg),
                        processing_time_ms,
                    });
                } else {
                    pb.abandon();
                    error!("Failed to ingest {}: {}", path.display(), error_msg);
                    if let Some(id) = failed_file {
                        eprintln!("Retry with: rcpt file process {}", id);
                    }
                    anyhow::bail!("Ingestion failed for {}: {}", path.display(), error_msg);
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let processed = results
        .iter()
        .filter(|r| r.outcome.as_ref().is_some_and(|o| o.processed.is_some()))
        .count();
    let rejected: Vec<_> = results
        .iter()
        .filter(|r| r.outcome.as_ref().is_some_and(|o| !o.validation.valid))
        .collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Ingested {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} processed, {} rejected, {} failed",
        style(processed).green(),
        style(rejected.len()).yellow(),
        style(failed.len()).red()
    );

    if !rejected.is_empty() {
        println!();
        println!("{}", style("Rejected files:").yellow());
        for result in &rejected {
            let reason = result
                .outcome
                .as_ref()
                .and_then(|o| o.validation.reason)
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!("  - {}: {}", result.path.display(), reason);
        }
    }

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
            if let Some(id) = result.failed_file {
                println!("    retry with: rcpt file process {}", id);
            }
        }
    }

    Ok(())
}

async fn ingest_file(pipeline: &IngestionPipeline, path: &Path) -> anyhow::Result<IngestOutcome> {
    let data = fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    Ok(pipeline.ingest(filename, &data).await?)
}

fn write_summary(path: &Path, results: &[IngestResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "file_id",
        "status",
        "reason",
        "receipt_id",
        "warnings",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let elapsed = result.processing_time_ms.to_string();

        match &result.outcome {
            Some(outcome) => {
                let (status, receipt_id, warnings) = match &outcome.processed {
                    Some(ProcessOutcome::Created {
                        receipt_id,
                        warnings,
                    }) => (
                        "processed",
                        receipt_id.to_string(),
                        warnings
                            .iter()
                            .map(|w| w.code())
                            .collect::<Vec<_>>()
                            .join(";"),
                    ),
                    Some(ProcessOutcome::AlreadyProcessed { receipt_id }) => {
                        ("already_processed", receipt_id.to_string(), String::new())
                    }
                    None => ("rejected", String::new(), String::new()),
                };
                let reason = outcome
                    .validation
                    .reason
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                wtr.write_record([
                    filename,
                    &outcome.file_id.to_string(),
                    status,
                    &reason,
                    &receipt_id,
                    &warnings,
                    &elapsed,
                    "",
                ])?;
            }
            None => {
                let file_id = result
                    .failed_file
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                wtr.write_record([
                    filename,
                    &file_id,
                    "error",
                    "",
                    "",
                    "",
                    &elapsed,
                    result.error.as_deref().unwrap_or(""),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
