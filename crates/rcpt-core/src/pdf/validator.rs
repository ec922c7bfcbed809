//! Structural validation of uploaded documents.

use lopdf::{Document, Object};
use tracing::debug;

use super::through_last_eof;
use crate::models::receipt::{InvalidReason, ValidationResult};

/// Signature every PDF starts with.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Classifies a byte stream as a usable PDF or explains why it is not.
///
/// Checks run cheapest first: signature, trailer marker, full parse,
/// decryption, page tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileValidator;

impl FileValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, data: &[u8]) -> ValidationResult {
        if !data.starts_with(PDF_MAGIC) {
            return ValidationResult::invalid(
                InvalidReason::NotADocument,
                "missing %PDF- signature",
            );
        }

        let Some(data) = through_last_eof(data) else {
            return ValidationResult::invalid(InvalidReason::Corrupted, "missing %%EOF marker");
        };

        let mut doc = match Document::load_mem(data) {
            Ok(doc) => doc,
            Err(e) => {
                debug!("PDF parse failed: {}", e);
                return ValidationResult::invalid(InvalidReason::Corrupted, e.to_string());
            }
        };

        if doc.is_encrypted() && doc.decrypt("").is_err() {
            return ValidationResult::invalid(
                InvalidReason::Corrupted,
                "encrypted with a non-empty password",
            );
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return ValidationResult::invalid(InvalidReason::Empty, "document has no pages");
        }

        for (number, page_id) in &pages {
            if !matches!(doc.get_object(*page_id), Ok(Object::Dictionary(_))) {
                return ValidationResult::invalid(
                    InvalidReason::Corrupted,
                    format!("page {} is not a dictionary", number),
                );
            }
        }

        debug!("PDF valid with {} pages", pages.len());
        ValidationResult::valid()
    }
}
