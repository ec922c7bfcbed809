//! Receipts command - list and show stored receipt records.

use clap::{Args, Subcommand};

use rcpt_core::models::receipt::{ReceiptId, ReceiptRecord};

use super::OutputFormat;
use super::context::{load_config, open_pipeline};

/// Arguments for the receipts command.
#[derive(Args)]
pub struct ReceiptsArgs {
    #[command(subcommand)]
    command: ReceiptsCommand,
}

#[derive(Subcommand)]
enum ReceiptsCommand {
    /// List receipt records in creation order
    List {
        /// Number of records to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum number of records to show
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Show one receipt record with its line items
    Show {
        /// Receipt record id
        id: i64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
}

pub async fn run(args: ReceiptsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pipeline = open_pipeline(&config)?;

    let (records, format) = match args.command {
        ReceiptsCommand::List {
            skip,
            limit,
            format,
        } => (pipeline.list_receipts(skip, limit)?, format),
        ReceiptsCommand::Show { id, format } => match pipeline.get_receipt(ReceiptId(id))? {
            Some(record) => (vec![record], format),
            None => anyhow::bail!("Receipt {} not found", id),
        },
    };

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&records)?,
        OutputFormat::Csv => format_records_csv(&records)?,
        OutputFormat::Text => records
            .iter()
            .map(format_record_text)
            .collect::<Vec<_>>()
            .join("\n"),
    };
    println!("{}", output);

    Ok(())
}

fn format_records_csv(records: &[ReceiptRecord]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "file_id",
        "merchant",
        "purchased_at",
        "total_amount",
        "items",
        "warnings",
        "source_path",
        "created_at",
    ])?;

    for record in records {
        wtr.write_record([
            &record.id.to_string(),
            &record.file_id.to_string(),
            record.merchant.as_deref().unwrap_or(""),
            &record.purchased_at.map(|t| t.to_string()).unwrap_or_default(),
            &record.total_amount.map(|d| d.to_string()).unwrap_or_default(),
            &record.items.len().to_string(),
            &warning_codes(record),
            &record.source_path,
            &record.created_at.to_rfc3339(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_record_text(record: &ReceiptRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("Receipt: {}\n", record.id));
    output.push_str(&format!(
        "Merchant: {}\n",
        record.merchant.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!(
        "Purchased: {}\n",
        record
            .purchased_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    ));

    if !record.items.is_empty() {
        output.push('\n');
        output.push_str("Items:\n");
        for item in &record.items {
            output.push_str(&format!(
                "  {:<24} {:>6} x {:>8} = {:>8}\n",
                item.name,
                item.quantity.to_string(),
                item.unit_price.to_string(),
                item.line_total.to_string()
            ));
        }
    }

    output.push('\n');
    output.push_str(&format!(
        "Total: {}\n",
        record
            .total_amount
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    if !record.warnings.is_empty() {
        output.push_str(&format!("Warnings: {}\n", warning_codes(record)));
    }

    output
}

fn warning_codes(record: &ReceiptRecord) -> String {
    record
        .warnings
        .iter()
        .map(|w| w.code())
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ReceiptRecord {
        serde_json::from_value(serde_json::json!({
            "id": 4,
            "file_id": 9,
            "merchant": "CORNER CAFE",
            "total_amount": "9.99",
            "source_path": "blob",
            "warnings": ["TOTAL_MISMATCH", "NO_DATE"],
            "created_at": "2024-03-02T08:15:00Z",
            "updated_at": "2024-03-02T08:15:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_text_shows_stored_warnings() {
        let text = format_record_text(&record());
        assert!(text.contains("Merchant: CORNER CAFE"));
        assert!(text.contains("Warnings: NO_DATE;TOTAL_MISMATCH"));
    }

    #[test]
    fn test_csv_has_warnings_column() {
        let csv = format_records_csv(&[record()]).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().contains(",warnings,"));
        assert!(lines.next().unwrap().contains(",NO_DATE;TOTAL_MISMATCH,"));
    }
}
