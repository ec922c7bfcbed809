//! Receipt parser combining the rule-based field extractors.

use std::time::Instant;

use tracing::{debug, info};

use crate::models::config::ParserConfig;
use crate::models::receipt::{ParseWarning, ParsedReceipt};

use super::rules::{
    DateExtractor, FieldExtractor, ItemExtractor, MerchantExtractor, TotalExtractor, normalize_text,
};

/// Turns recognized page texts into a structured receipt candidate.
///
/// Parsing never fails: a field that cannot be found stays unset and the
/// matching warning is recorded instead.
pub struct ReceiptParser {
    config: ParserConfig,
    merchant: MerchantExtractor,
    dates: DateExtractor,
    totals: TotalExtractor,
    items: ItemExtractor,
}

impl ReceiptParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            merchant: MerchantExtractor::new(config.merchant_scan_lines),
            dates: DateExtractor::new(),
            totals: TotalExtractor::new(),
            items: ItemExtractor::new(),
            config,
        }
    }

    /// Parse page texts given in page order.
    pub fn parse<S: AsRef<str>>(&self, pages: &[S]) -> ParsedReceipt {
        let start = Instant::now();
        let pages: Vec<Vec<String>> = pages.iter().map(|p| normalize_text(p.as_ref())).collect();
        let first_page = pages.first().map(|lines| lines.join("\n")).unwrap_or_default();
        let text = pages
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut receipt = ParsedReceipt::default();

        if text.is_empty() {
            receipt.warnings.insert(ParseWarning::NoText);
        }

        match self.merchant.extract(&first_page) {
            Some(m) => {
                debug!("Merchant '{}' (confidence {:.2})", m.value, m.confidence);
                receipt.merchant = Some(m.value);
            }
            None => {
                receipt.warnings.insert(ParseWarning::NoMerchant);
            }
        }

        match self.dates.extract(&text) {
            Some(m) => {
                debug!("Purchase date from '{}' (confidence {:.2})", m.source, m.confidence);
                receipt.purchased_at = Some(m.value);
            }
            None => {
                receipt.warnings.insert(ParseWarning::NoDate);
            }
        }

        match self.totals.extract(&text) {
            Some(m) => {
                debug!("Total from '{}' (confidence {:.2})", m.source, m.confidence);
                receipt.total_amount = Some(m.value);
            }
            None => {
                receipt.warnings.insert(ParseWarning::NoTotal);
            }
        }

        receipt.items = self
            .items
            .extract_all(&text)
            .into_iter()
            .map(|m| m.value)
            .collect();
        if receipt.items.is_empty() {
            receipt.warnings.insert(ParseWarning::NoItems);
        }

        if let Some(total) = receipt.total_amount {
            if !receipt.items.is_empty() {
                let gap = receipt
                    .items_total()
                    .and_then(|sum| sum.checked_sub(total))
                    .map(|gap| gap.abs());
                match gap {
                    Some(gap) if gap <= self.config.tolerance_for(total) => {}
                    Some(gap) => {
                        debug!("Items sum differs from total {} by {}", total, gap);
                        receipt.warnings.insert(ParseWarning::TotalMismatch);
                    }
                    None => {
                        debug!("Items sum out of range for total {}", total);
                        receipt.warnings.insert(ParseWarning::TotalMismatch);
                    }
                }
            }
        }

        info!(
            "Parsed receipt: {} items, {} warnings in {}ms",
            receipt.items.len(),
            receipt.warnings.len(),
            start.elapsed().as_millis()
        );
        receipt
    }
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}
