//! Amount parsing and total detection.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT, AMOUNT_ONLY, TOTAL_EXCLUDED, TOTAL_KEYWORD};
use super::{ExtractionMatch, FieldExtractor};

/// Parse a currency-shaped number ("1,234.56", "$42.50", "42,50").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let normalized = if cleaned.contains('.') {
        cleaned.replace(',', "")
    } else {
        cleaned.replace(',', ".")
    };

    Decimal::from_str(&normalized).ok()
}

/// Detects the grand total: the last total-keyword line with an amount.
pub struct TotalExtractor;

impl TotalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Amount adjacent to the keyword on `line`: after it first, then before it.
    fn amount_on_line(line: &str, keyword_start: usize, keyword_end: usize) -> Option<Decimal> {
        let after = AMOUNT
            .captures_iter(&line[keyword_end..])
            .last()
            .and_then(|caps| parse_amount(&caps[1]));
        after.or_else(|| {
            AMOUNT
                .captures_iter(&line[..keyword_start])
                .last()
                .and_then(|caps| parse_amount(&caps[1]))
        })
    }
}

impl Default for TotalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for TotalExtractor {
    type Output = ExtractionMatch<Decimal>;

    /// The last match in reading order; subtotals come before grand totals.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().last()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let lines: Vec<&str> = text.lines().collect();
        let mut results = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(keyword) = TOTAL_KEYWORD.find(line) else {
                continue;
            };
            if TOTAL_EXCLUDED.is_match(line) {
                continue;
            }

            if let Some(amount) = Self::amount_on_line(line, keyword.start(), keyword.end()) {
                results.push(ExtractionMatch::new(amount, 0.9, *line));
                continue;
            }

            // Keyword and amount split across lines by the recognizer.
            if let Some(next) = lines.get(i + 1) {
                if let Some(caps) = AMOUNT_ONLY.captures(next.trim()) {
                    if let Some(amount) = parse_amount(&caps[1]) {
                        results.push(ExtractionMatch::new(amount, 0.7, format!("{} {}", line, next)));
                    }
                }
            }
        }

        results
    }
}
