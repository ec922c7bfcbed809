//! Core library for receipt ingestion.
//!
//! This crate provides:
//! - PDF validation and page access
//! - Page text recognition (ONNX models or the tesseract CLI)
//! - Rule-based receipt field extraction (merchant, date, total, line items)
//! - Repository and blob store collaborators (SQLite, filesystem, in-memory)
//! - The ingestion pipeline tying them together

pub mod error;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod receipt;
pub mod storage;

#[cfg(test)]
mod testing;

pub use error::{RcptError, Result};
pub use models::config::RcptConfig;
pub use models::receipt::{
    FileId, InvalidReason, LineItem, ParseWarning, ParsedItem, ParsedReceipt, ReceiptId,
    ReceiptRecord, TrackedFile, ValidationResult, ValidityState,
};
pub use ocr::{PageText, Recognizer, TextExtractor, create_recognizer};
pub use pdf::{FileValidator, PdfExtractor, PdfProcessor};
pub use pipeline::{ExtractionPool, IngestOutcome, IngestionPipeline, ProcessOutcome};
pub use receipt::ReceiptParser;
pub use storage::{
    BlobStore, FsBlobStore, MemoryBlobStore, MemoryRepository, Repository, SqliteRepository,
};
