//! Persistence collaborators: the repository and the blob store.
//!
//! The pipeline only sees these traits; implementations are injected.

mod blob;
mod memory;
mod sqlite;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use crate::error::StoreError;
use crate::models::receipt::{
    FileId, NewReceiptRecord, NewTrackedFile, ParsedItem, ReceiptId, ReceiptRecord, TrackedFile,
    ValidationResult,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result of atomically marking a file processed and storing its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call won; the record was created.
    Created(ReceiptId),
    /// Another call already processed the file; its record id.
    AlreadyProcessed(ReceiptId),
}

impl CommitOutcome {
    pub fn receipt_id(&self) -> ReceiptId {
        match self {
            CommitOutcome::Created(id) | CommitOutcome::AlreadyProcessed(id) => *id,
        }
    }
}

/// Tracked files, receipt records and their line items.
pub trait Repository: Send + Sync {
    /// Register an uploaded file (validity unknown, unprocessed).
    fn create_tracked_file(&self, meta: NewTrackedFile) -> Result<FileId>;

    fn get_tracked_file(&self, id: FileId) -> Result<Option<TrackedFile>>;

    /// Persist a validation outcome. Rejected once the file is processed.
    fn update_validity(&self, id: FileId, result: &ValidationResult) -> Result<()>;

    /// Flip the processing state in one conditional update.
    ///
    /// Returns false if the file was already processed. Fails if the file is
    /// not validated as valid.
    fn mark_processed(&self, id: FileId) -> Result<bool>;

    /// Insert a record together with its items.
    fn create_receipt_record(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<ReceiptId>;

    /// `mark_processed` and `create_receipt_record` as one atomic unit.
    ///
    /// Concurrent calls for one file create exactly one record; the others
    /// observe [`CommitOutcome::AlreadyProcessed`].
    fn commit_receipt(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<CommitOutcome>;

    /// Record produced from a file, if any.
    fn receipt_for_file(&self, id: FileId) -> Result<Option<ReceiptId>>;

    fn get_receipt_record(&self, id: ReceiptId) -> Result<Option<ReceiptRecord>>;

    /// Records in creation order, with their items.
    fn list_receipt_records(&self, skip: usize, limit: usize) -> Result<Vec<ReceiptRecord>>;
}

/// Opaque byte storage keyed by path.
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the path to read them back.
    fn store(&self, data: &[u8]) -> Result<String>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;
}
