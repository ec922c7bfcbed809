//! Merchant name detection from the top of the first page.

use super::patterns::{DECORATION, NON_MERCHANT, PHONE_NUMBER, POSTAL_CODE, WEB_OR_EMAIL};
use super::{ExtractionMatch, FieldExtractor};

/// Picks the first plausible business name among the leading lines.
pub struct MerchantExtractor {
    scan_lines: usize,
}

impl MerchantExtractor {
    pub fn new(scan_lines: usize) -> Self {
        Self { scan_lines }
    }

    fn candidate(line: &str) -> Option<String> {
        let cleaned = DECORATION.replace_all(line.trim(), "");
        let cleaned = cleaned.trim();

        if cleaned.chars().count() < 3 || !cleaned.chars().any(char::is_alphabetic) {
            return None;
        }
        if NON_MERCHANT.is_match(cleaned)
            || PHONE_NUMBER.is_match(cleaned)
            || POSTAL_CODE.is_match(cleaned)
            || WEB_OR_EMAIL.is_match(cleaned)
        {
            return None;
        }
        Some(cleaned.to_string())
    }
}

impl Default for MerchantExtractor {
    fn default() -> Self {
        Self::new(6)
    }
}

impl FieldExtractor for MerchantExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    /// Candidates in top-down order; earlier lines score higher.
    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .take(self.scan_lines)
            .enumerate()
            .filter_map(|(i, line)| {
                Self::candidate(line).map(|name| {
                    let confidence = (0.9 - 0.1 * i as f32).max(0.3);
                    ExtractionMatch::new(name, confidence, line)
                })
            })
            .collect()
    }
}
