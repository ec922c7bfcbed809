//! Receipt data models: tracked files, parsed receipts and persisted records.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifier of a tracked file.
    FileId
);
id_type!(
    /// Identifier of a receipt record.
    ReceiptId
);
id_type!(
    /// Identifier of a line item.
    LineItemId
);

/// Whether a file is structurally acceptable for processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityState {
    /// Not validated yet.
    #[default]
    Unknown,
    /// Passed every validation check.
    Valid,
    /// Rejected; see the invalid reason.
    Invalid,
}

impl ValidityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityState::Unknown => "unknown",
            ValidityState::Valid => "valid",
            ValidityState::Invalid => "invalid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(ValidityState::Unknown),
            "valid" => Some(ValidityState::Valid),
            "invalid" => Some(ValidityState::Invalid),
            _ => None,
        }
    }
}

/// Why a file failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    /// Missing the `%PDF-` signature.
    NotADocument,
    /// Truncated or structurally broken container.
    Corrupted,
    /// Container holds no pages.
    Empty,
}

impl InvalidReason {
    /// Stable code used for persistence and display.
    pub fn code(&self) -> &'static str {
        match self {
            InvalidReason::NotADocument => "NOT_A_DOCUMENT",
            InvalidReason::Corrupted => "CORRUPTED",
            InvalidReason::Empty => "EMPTY",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NOT_A_DOCUMENT" => Some(InvalidReason::NotADocument),
            "CORRUPTED" => Some(InvalidReason::Corrupted),
            "EMPTY" => Some(InvalidReason::Empty),
            _ => None,
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of validating a byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the document is acceptable.
    pub valid: bool,

    /// Set if and only if `valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,

    /// Human-readable detail from the failing check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            detail: None,
        }
    }

    pub fn invalid(reason: InvalidReason, detail: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            detail: Some(detail.into()),
        }
    }
}

/// An uploaded document under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub id: FileId,

    /// Original filename as uploaded.
    pub filename: String,

    /// Blob store path of the file contents.
    pub path: String,

    pub validity: ValidityState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,

    /// Whether a receipt record has been produced from this file.
    pub processed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedFile {
    pub fn is_valid(&self) -> bool {
        self.validity == ValidityState::Valid
    }

    /// Reconstruct the stored validation outcome, if the file was validated.
    pub fn validation(&self) -> Option<ValidationResult> {
        match self.validity {
            ValidityState::Unknown => None,
            ValidityState::Valid => Some(ValidationResult::valid()),
            ValidityState::Invalid => Some(ValidationResult {
                valid: false,
                reason: self.invalid_reason,
                detail: None,
            }),
        }
    }
}

/// Metadata for registering a freshly uploaded file.
#[derive(Debug, Clone)]
pub struct NewTrackedFile {
    pub filename: String,
    pub path: String,
}

/// Non-fatal signal attached to a parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseWarning {
    /// No plausible merchant line near the top of the first page.
    NoMerchant,
    /// No date pattern matched.
    NoDate,
    /// No total keyword with an adjacent amount.
    NoTotal,
    /// Item totals diverge from the detected total beyond tolerance.
    TotalMismatch,
    /// No line matched an item pattern.
    NoItems,
    /// Recognition produced no text at all.
    NoText,
}

impl ParseWarning {
    pub fn code(&self) -> &'static str {
        match self {
            ParseWarning::NoMerchant => "NO_MERCHANT",
            ParseWarning::NoDate => "NO_DATE",
            ParseWarning::NoTotal => "NO_TOTAL",
            ParseWarning::TotalMismatch => "TOTAL_MISMATCH",
            ParseWarning::NoItems => "NO_ITEMS",
            ParseWarning::NoText => "NO_TEXT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NO_MERCHANT" => Some(ParseWarning::NoMerchant),
            "NO_DATE" => Some(ParseWarning::NoDate),
            "NO_TOTAL" => Some(ParseWarning::NoTotal),
            "TOTAL_MISMATCH" => Some(ParseWarning::TotalMismatch),
            "NO_ITEMS" => Some(ParseWarning::NoItems),
            "NO_TEXT" => Some(ParseWarning::NoText),
            _ => None,
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One itemized row as recognized by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub name: String,
    /// May be fractional (weighed goods).
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Structured candidate produced from recognized page text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<NaiveDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    #[serde(default)]
    pub items: Vec<ParsedItem>,

    #[serde(default)]
    pub warnings: BTreeSet<ParseWarning>,
}

impl ParsedReceipt {
    /// Sum of all item line totals, `None` if the sum overflows.
    pub fn items_total(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total))
    }

    pub fn has_warning(&self, warning: ParseWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

/// A persisted line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub receipt_id: ReceiptId,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// A persisted receipt record with its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub id: ReceiptId,

    /// Tracked file this record was produced from.
    pub file_id: FileId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<NaiveDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    pub source_path: String,

    #[serde(default)]
    pub items: Vec<LineItem>,

    /// Parse warnings recorded when the record was created.
    #[serde(default)]
    pub warnings: BTreeSet<ParseWarning>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a receipt record before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceiptRecord {
    pub file_id: FileId,
    pub merchant: Option<String>,
    pub purchased_at: Option<NaiveDateTime>,
    pub total_amount: Option<Decimal>,
    pub source_path: String,
    pub warnings: BTreeSet<ParseWarning>,
}

impl NewReceiptRecord {
    pub fn from_parsed(file: &TrackedFile, parsed: &ParsedReceipt) -> Self {
        Self {
            file_id: file.id,
            merchant: parsed.merchant.clone(),
            purchased_at: parsed.purchased_at,
            total_amount: parsed.total_amount,
            source_path: file.path.clone(),
            warnings: parsed.warnings.clone(),
        }
    }
}
