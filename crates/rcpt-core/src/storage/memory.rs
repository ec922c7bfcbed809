//! In-memory repository for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{CommitOutcome, Repository, Result};
use crate::error::StoreError;
use crate::models::receipt::{
    FileId, LineItem, LineItemId, NewReceiptRecord, NewTrackedFile, ParsedItem, ReceiptId,
    ReceiptRecord, TrackedFile, ValidationResult, ValidityState,
};

#[derive(Default)]
struct State {
    files: BTreeMap<FileId, TrackedFile>,
    records: BTreeMap<ReceiptId, ReceiptRecord>,
    next_file: i64,
    next_record: i64,
    next_item: i64,
}

impl State {
    fn file_mut(&mut self, id: FileId) -> Result<&mut TrackedFile> {
        self.files.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "tracked file",
            id: id.0,
        })
    }

    fn receipt_for_file(&self, id: FileId) -> Option<ReceiptId> {
        self.records
            .values()
            .find(|r| r.file_id == id)
            .map(|r| r.id)
    }

    fn mark_processed(&mut self, id: FileId) -> Result<bool> {
        let file = self.file_mut(id)?;
        if file.processed {
            return Ok(false);
        }
        if file.validity != ValidityState::Valid {
            return Err(StoreError::Invariant(format!(
                "file {} is not valid and cannot be processed",
                id
            )));
        }
        file.processed = true;
        file.updated_at = Utc::now();
        Ok(true)
    }

    fn insert_record(&mut self, record: NewReceiptRecord, items: Vec<ParsedItem>) -> Result<ReceiptId> {
        if !self.files.contains_key(&record.file_id) {
            return Err(StoreError::NotFound {
                entity: "tracked file",
                id: record.file_id.0,
            });
        }
        if let Some(existing) = self.receipt_for_file(record.file_id) {
            return Err(StoreError::Invariant(format!(
                "file {} already has receipt {}",
                record.file_id, existing
            )));
        }

        self.next_record += 1;
        let id = ReceiptId(self.next_record);
        let items = items
            .into_iter()
            .map(|item| {
                self.next_item += 1;
                LineItem {
                    id: LineItemId(self.next_item),
                    receipt_id: id,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                }
            })
            .collect();

        let now = Utc::now();
        self.records.insert(
            id,
            ReceiptRecord {
                id,
                file_id: record.file_id,
                merchant: record.merchant,
                purchased_at: record.purchased_at,
                total_amount: record.total_amount,
                source_path: record.source_path,
                items,
                warnings: record.warnings,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }
}

/// Repository keeping everything behind one mutex.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Invariant("repository lock poisoned".to_string()))
    }
}

impl Repository for MemoryRepository {
    fn create_tracked_file(&self, meta: NewTrackedFile) -> Result<FileId> {
        let mut state = self.state()?;
        state.next_file += 1;
        let id = FileId(state.next_file);
        let now = Utc::now();
        state.files.insert(
            id,
            TrackedFile {
                id,
                filename: meta.filename,
                path: meta.path,
                validity: ValidityState::Unknown,
                invalid_reason: None,
                processed: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn get_tracked_file(&self, id: FileId) -> Result<Option<TrackedFile>> {
        Ok(self.state()?.files.get(&id).cloned())
    }

    fn update_validity(&self, id: FileId, result: &ValidationResult) -> Result<()> {
        let mut state = self.state()?;
        let file = state.file_mut(id)?;
        if file.processed {
            return Err(StoreError::Invariant(format!(
                "file {} is processed; validity is frozen",
                id
            )));
        }
        if result.valid {
            file.validity = ValidityState::Valid;
            file.invalid_reason = None;
        } else {
            file.validity = ValidityState::Invalid;
            file.invalid_reason = result.reason;
        }
        file.updated_at = Utc::now();
        Ok(())
    }

    fn mark_processed(&self, id: FileId) -> Result<bool> {
        self.state()?.mark_processed(id)
    }

    fn create_receipt_record(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<ReceiptId> {
        self.state()?.insert_record(record, items)
    }

    fn commit_receipt(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<CommitOutcome> {
        let mut state = self.state()?;
        let file_id = record.file_id;
        if !state.mark_processed(file_id)? {
            let existing = state.receipt_for_file(file_id).ok_or_else(|| {
                StoreError::Invariant(format!("file {} is processed but has no receipt", file_id))
            })?;
            return Ok(CommitOutcome::AlreadyProcessed(existing));
        }
        match state.insert_record(record, items) {
            Ok(id) => Ok(CommitOutcome::Created(id)),
            Err(e) => {
                // Roll back so the file stays retriable.
                if let Ok(file) = state.file_mut(file_id) {
                    file.processed = false;
                }
                Err(e)
            }
        }
    }

    fn receipt_for_file(&self, id: FileId) -> Result<Option<ReceiptId>> {
        Ok(self.state()?.receipt_for_file(id))
    }

    fn get_receipt_record(&self, id: ReceiptId) -> Result<Option<ReceiptRecord>> {
        Ok(self.state()?.records.get(&id).cloned())
    }

    fn list_receipt_records(&self, skip: usize, limit: usize) -> Result<Vec<ReceiptRecord>> {
        Ok(self
            .state()?
            .records
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn test_tracked_file_lifecycle() {
        contract::tracked_file_lifecycle(&MemoryRepository::new());
    }

    #[test]
    fn test_mark_processed_requires_valid() {
        contract::mark_processed_requires_valid(&MemoryRepository::new());
    }

    #[test]
    fn test_commit_is_idempotent() {
        contract::commit_is_idempotent(&MemoryRepository::new());
    }

    #[test]
    fn test_records_round_trip_and_page() {
        contract::records_round_trip_and_page(&MemoryRepository::new());
    }
}
