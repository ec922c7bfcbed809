//! SQLite-backed repository.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{CommitOutcome, Repository, Result};
use crate::error::StoreError;
use crate::models::receipt::{
    FileId, InvalidReason, LineItem, LineItemId, NewReceiptRecord, NewTrackedFile, ParseWarning,
    ParsedItem, ReceiptId, ReceiptRecord, TrackedFile, ValidationResult, ValidityState,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracked_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        path TEXT NOT NULL,
        validity TEXT NOT NULL DEFAULT 'unknown',
        invalid_reason TEXT,
        processed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK ((validity = 'invalid') = (invalid_reason IS NOT NULL)),
        CHECK (processed = 0 OR validity = 'valid')
    );

    CREATE TABLE IF NOT EXISTS receipt_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL UNIQUE REFERENCES tracked_files(id),
        merchant TEXT,
        purchased_at TEXT,
        total_amount TEXT,
        source_path TEXT NOT NULL,
        warnings TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS line_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        receipt_id INTEGER NOT NULL REFERENCES receipt_records(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        quantity TEXT NOT NULL,
        unit_price TEXT NOT NULL,
        line_total TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_line_items_receipt_id ON line_items(receipt_id);
";

const PURCHASED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const FILE_COLUMNS: &str =
    "id, filename, path, validity, invalid_reason, processed, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, file_id, merchant, purchased_at, total_amount, source_path, \
     warnings, created_at, updated_at";

/// Warning codes joined with commas, in set order.
fn encode_warnings(warnings: &BTreeSet<ParseWarning>) -> String {
    warnings
        .iter()
        .map(|w| w.code())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_warnings(s: &str) -> Result<BTreeSet<ParseWarning>> {
    s.split(',')
        .filter(|code| !code.is_empty())
        .map(|code| {
            ParseWarning::from_code(code)
                .ok_or_else(|| StoreError::Decode(format!("parse warning '{}'", code)))
        })
        .collect()
}

fn timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp '{}': {}", s, e)))
}

fn decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| StoreError::Decode(format!("decimal '{}': {}", s, e)))
}

struct FileRow {
    id: i64,
    filename: String,
    path: String,
    validity: String,
    invalid_reason: Option<String>,
    processed: bool,
    created_at: String,
    updated_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            path: row.get(2)?,
            validity: row.get(3)?,
            invalid_reason: row.get(4)?,
            processed: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_model(self) -> Result<TrackedFile> {
        let validity = ValidityState::from_str(&self.validity)
            .ok_or_else(|| StoreError::Decode(format!("validity '{}'", self.validity)))?;
        let invalid_reason = match self.invalid_reason {
            Some(code) => Some(
                InvalidReason::from_code(&code)
                    .ok_or_else(|| StoreError::Decode(format!("invalid reason '{}'", code)))?,
            ),
            None => None,
        };
        Ok(TrackedFile {
            id: FileId(self.id),
            filename: self.filename,
            path: self.path,
            validity,
            invalid_reason,
            processed: self.processed,
            created_at: timestamp(&self.created_at)?,
            updated_at: timestamp(&self.updated_at)?,
        })
    }
}

struct RecordRow {
    id: i64,
    file_id: i64,
    merchant: Option<String>,
    purchased_at: Option<String>,
    total_amount: Option<String>,
    source_path: String,
    warnings: String,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_id: row.get(1)?,
            merchant: row.get(2)?,
            purchased_at: row.get(3)?,
            total_amount: row.get(4)?,
            source_path: row.get(5)?,
            warnings: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_model(self, items: Vec<LineItem>) -> Result<ReceiptRecord> {
        let purchased_at = match self.purchased_at {
            Some(s) => Some(
                NaiveDateTime::parse_from_str(&s, PURCHASED_AT_FORMAT)
                    .map_err(|e| StoreError::Decode(format!("purchased_at '{}': {}", s, e)))?,
            ),
            None => None,
        };
        let total_amount = self.total_amount.as_deref().map(decimal).transpose()?;
        Ok(ReceiptRecord {
            id: ReceiptId(self.id),
            file_id: FileId(self.file_id),
            merchant: self.merchant,
            purchased_at,
            total_amount,
            source_path: self.source_path,
            items,
            warnings: decode_warnings(&self.warnings)?,
            created_at: timestamp(&self.created_at)?,
            updated_at: timestamp(&self.updated_at)?,
        })
    }
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository persisting to a SQLite database file.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let repo = Self::with_connection(conn)?;
        info!("Database initialized at {}", path.as_ref().display());
        Ok(repo)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // Other processes may hold the write lock while committing
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Bring databases created before warnings were stored up to date.
    fn migrate(conn: &Connection) -> Result<()> {
        let has_warnings = conn
            .prepare("SELECT 1 FROM pragma_table_info('receipt_records') WHERE name = 'warnings'")?
            .exists([])?;
        if !has_warnings {
            conn.execute_batch(
                "ALTER TABLE receipt_records ADD COLUMN warnings TEXT NOT NULL DEFAULT ''",
            )?;
            debug!("Added warnings column to receipt_records");
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Invariant("connection lock poisoned".to_string()))
    }

    fn file_state(conn: &Connection, id: FileId) -> Result<Option<(bool, String)>> {
        Ok(conn
            .query_row(
                "SELECT processed, validity FROM tracked_files WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    /// The conditional update guarding the processed transition.
    fn mark_processed_on(conn: &Connection, id: FileId) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE tracked_files SET processed = 1, updated_at = ?1
             WHERE id = ?2 AND processed = 0 AND validity = 'valid'",
            params![Utc::now().to_rfc3339(), id.0],
        )?;
        if changed == 1 {
            return Ok(true);
        }

        match Self::file_state(conn, id)? {
            None => Err(StoreError::NotFound {
                entity: "tracked file",
                id: id.0,
            }),
            Some((true, _)) => Ok(false),
            Some((false, validity)) => Err(StoreError::Invariant(format!(
                "file {} is {} and cannot be processed",
                id, validity
            ))),
        }
    }

    fn insert_record_on(
        conn: &Connection,
        record: &NewReceiptRecord,
        items: &[ParsedItem],
    ) -> Result<ReceiptId> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO receipt_records
                (file_id, merchant, purchased_at, total_amount, source_path, warnings,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                record.file_id.0,
                record.merchant,
                record
                    .purchased_at
                    .map(|t| t.format(PURCHASED_AT_FORMAT).to_string()),
                record.total_amount.map(|d| d.to_string()),
                record.source_path,
                encode_warnings(&record.warnings),
                now,
            ],
        )?;
        let receipt_id = conn.last_insert_rowid();

        let mut stmt = conn.prepare(
            "INSERT INTO line_items (receipt_id, name, quantity, unit_price, line_total)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for item in items {
            stmt.execute(params![
                receipt_id,
                item.name,
                item.quantity.to_string(),
                item.unit_price.to_string(),
                item.line_total.to_string(),
            ])?;
        }

        debug!(receipt_id, items = items.len(), "Receipt record stored");
        Ok(ReceiptId(receipt_id))
    }

    fn receipt_for_file_on(conn: &Connection, id: FileId) -> Result<Option<ReceiptId>> {
        Ok(conn
            .query_row(
                "SELECT id FROM receipt_records WHERE file_id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?
            .map(ReceiptId))
    }

    fn items_on(conn: &Connection, receipt_id: i64) -> Result<Vec<LineItem>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, quantity, unit_price, line_total
             FROM line_items WHERE receipt_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![receipt_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, name, quantity, unit_price, line_total) = row?;
            items.push(LineItem {
                id: LineItemId(id),
                receipt_id: ReceiptId(receipt_id),
                name,
                quantity: decimal(&quantity)?,
                unit_price: decimal(&unit_price)?,
                line_total: decimal(&line_total)?,
            });
        }
        Ok(items)
    }
}

impl Repository for SqliteRepository {
    fn create_tracked_file(&self, meta: NewTrackedFile) -> Result<FileId> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO tracked_files (filename, path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![meta.filename, meta.path, now],
        )?;
        let id = conn.last_insert_rowid();
        info!(file_id = id, filename = %meta.filename, "Tracked file stored");
        Ok(FileId(id))
    }

    fn get_tracked_file(&self, id: FileId) -> Result<Option<TrackedFile>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM tracked_files WHERE id = ?1", FILE_COLUMNS),
                params![id.0],
                FileRow::from_row,
            )
            .optional()?;
        row.map(FileRow::into_model).transpose()
    }

    fn update_validity(&self, id: FileId, result: &ValidationResult) -> Result<()> {
        let conn = self.conn()?;
        let (validity, reason) = if result.valid {
            (ValidityState::Valid, None)
        } else {
            (ValidityState::Invalid, result.reason.map(|r| r.code()))
        };
        let changed = conn.execute(
            "UPDATE tracked_files SET validity = ?1, invalid_reason = ?2, updated_at = ?3
             WHERE id = ?4 AND processed = 0",
            params![validity.as_str(), reason, Utc::now().to_rfc3339(), id.0],
        )?;
        if changed == 1 {
            return Ok(());
        }

        match Self::file_state(&conn, id)? {
            None => Err(StoreError::NotFound {
                entity: "tracked file",
                id: id.0,
            }),
            Some(_) => Err(StoreError::Invariant(format!(
                "file {} is processed; validity is frozen",
                id
            ))),
        }
    }

    fn mark_processed(&self, id: FileId) -> Result<bool> {
        let conn = self.conn()?;
        Self::mark_processed_on(&conn, id)
    }

    fn create_receipt_record(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<ReceiptId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = Self::insert_record_on(&tx, &record, &items)?;
        tx.commit()?;
        Ok(id)
    }

    fn commit_receipt(
        &self,
        record: NewReceiptRecord,
        items: Vec<ParsedItem>,
    ) -> Result<CommitOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !Self::mark_processed_on(&tx, record.file_id)? {
            let existing = Self::receipt_for_file_on(&tx, record.file_id)?.ok_or_else(|| {
                StoreError::Invariant(format!(
                    "file {} is processed but has no receipt",
                    record.file_id
                ))
            })?;
            return Ok(CommitOutcome::AlreadyProcessed(existing));
        }

        let id = Self::insert_record_on(&tx, &record, &items)?;
        tx.commit()?;
        info!(file_id = record.file_id.0, receipt_id = id.0, "File processed");
        Ok(CommitOutcome::Created(id))
    }

    fn receipt_for_file(&self, id: FileId) -> Result<Option<ReceiptId>> {
        let conn = self.conn()?;
        Self::receipt_for_file_on(&conn, id)
    }

    fn get_receipt_record(&self, id: ReceiptId) -> Result<Option<ReceiptRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM receipt_records WHERE id = ?1", RECORD_COLUMNS),
                params![id.0],
                RecordRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => {
                let items = Self::items_on(&conn, row.id)?;
                row.into_model(items).map(Some)
            }
            None => Ok(None),
        }
    }

    fn list_receipt_records(&self, skip: usize, limit: usize) -> Result<Vec<ReceiptRecord>> {
        let conn = self.conn()?;
        let rows = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM receipt_records ORDER BY id LIMIT ?1 OFFSET ?2",
                RECORD_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(skip).unwrap_or(i64::MAX)
                ],
                RecordRow::from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter()
            .map(|row| {
                let items = Self::items_on(&conn, row.id)?;
                row.into_model(items)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn test_tracked_file_lifecycle() {
        contract::tracked_file_lifecycle(&SqliteRepository::in_memory().unwrap());
    }

    #[test]
    fn test_mark_processed_requires_valid() {
        contract::mark_processed_requires_valid(&SqliteRepository::in_memory().unwrap());
    }

    #[test]
    fn test_commit_is_idempotent() {
        contract::commit_is_idempotent(&SqliteRepository::in_memory().unwrap());
    }

    #[test]
    fn test_records_round_trip_and_page() {
        contract::records_round_trip_and_page(&SqliteRepository::in_memory().unwrap());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rcpt.db");

        let file_id = {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.create_tracked_file(NewTrackedFile {
                filename: "a.pdf".to_string(),
                path: "blob".to_string(),
            })
            .unwrap()
        };

        let repo = SqliteRepository::open(&path).unwrap();
        let file = repo.get_tracked_file(file_id).unwrap().unwrap();
        assert_eq!(file.filename, "a.pdf");
    }

    #[test]
    fn test_standalone_record_is_unique_per_file() {
        let repo = SqliteRepository::in_memory().unwrap();
        let file_id = repo
            .create_tracked_file(NewTrackedFile {
                filename: "a.pdf".to_string(),
                path: "blob".to_string(),
            })
            .unwrap();
        let record = NewReceiptRecord {
            file_id,
            merchant: None,
            purchased_at: None,
            total_amount: None,
            source_path: "blob".to_string(),
            warnings: BTreeSet::new(),
        };

        repo.create_receipt_record(record.clone(), vec![]).unwrap();
        assert!(matches!(
            repo.create_receipt_record(record, vec![]),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn test_concurrent_commits_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rcpt.db");
        let file_id = {
            let repo = SqliteRepository::open(&path).unwrap();
            let id = repo
                .create_tracked_file(NewTrackedFile {
                    filename: "a.pdf".to_string(),
                    path: "blob".to_string(),
                })
                .unwrap();
            repo.update_validity(id, &ValidationResult::valid()).unwrap();
            id
        };

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let repo = SqliteRepository::open(&path).unwrap();
                    let record = NewReceiptRecord {
                        file_id,
                        merchant: Some("ACME".to_string()),
                        purchased_at: None,
                        total_amount: None,
                        source_path: "blob".to_string(),
                        warnings: BTreeSet::new(),
                    };
                    barrier.wait();
                    repo.commit_receipt(record, vec![]).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<CommitOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, CommitOutcome::Created(_)))
            .count();
        assert_eq!(created, 1);
        let receipt_id = outcomes[0].receipt_id();
        assert!(outcomes.iter().all(|o| o.receipt_id() == receipt_id));

        let repo = SqliteRepository::open(&path).unwrap();
        assert_eq!(repo.list_receipt_records(0, 10).unwrap().len(), 1);
        assert_eq!(repo.receipt_for_file(file_id).unwrap(), Some(receipt_id));
    }

    #[test]
    fn test_opens_database_without_warnings_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rcpt.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE receipt_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    file_id INTEGER NOT NULL UNIQUE,
                    merchant TEXT,
                    purchased_at TEXT,
                    total_amount TEXT,
                    source_path TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                INSERT INTO receipt_records (file_id, source_path, created_at, updated_at)
                VALUES (1, 'blob', '2024-03-02T08:15:00+00:00', '2024-03-02T08:15:00+00:00');",
            )
            .unwrap();
        }

        let repo = SqliteRepository::open(&path).unwrap();
        let record = repo.get_receipt_record(ReceiptId(1)).unwrap().unwrap();
        assert_eq!(record.source_path, "blob");
        assert!(record.warnings.is_empty());
    }

    #[test]
    fn test_warning_codes_round_trip() {
        let warnings = BTreeSet::from([ParseWarning::NoDate, ParseWarning::TotalMismatch]);
        let encoded = encode_warnings(&warnings);
        assert_eq!(encoded, "NO_DATE,TOTAL_MISMATCH");
        assert_eq!(decode_warnings(&encoded).unwrap(), warnings);
        assert!(decode_warnings("").unwrap().is_empty());
        assert!(matches!(decode_warnings("BOGUS"), Err(StoreError::Decode(_))));
    }
}
