//! Rule-based field extractors for receipts.
//!
//! Each extractor is independent; ordered matcher lists inside dates and
//! items decide priority.

pub mod amounts;
pub mod dates;
pub mod items;
pub mod merchant;
pub mod normalize;
pub mod patterns;

pub use amounts::{TotalExtractor, parse_amount};
pub use dates::{DATE_PATTERNS, DateExtractor, DatePattern};
pub use items::{ITEM_PATTERNS, ItemExtractor, ItemPattern};
pub use merchant::MerchantExtractor;
pub use normalize::{normalize_line, normalize_text};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Byte range in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
