//! Ingestion pipeline: validate, extract, parse and persist tracked files.
//!
//! The lifecycle of a tracked file is `new -> validated -> processed`.
//! Validation happens once and is final. Only files validated as valid may
//! be processed, and processing a file twice returns the first record.

mod pool;

pub use pool::ExtractionPool;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, StateError, StoreError};
use crate::models::config::RcptConfig;
use crate::models::receipt::{
    FileId, NewReceiptRecord, NewTrackedFile, ParseWarning, ReceiptId, ReceiptRecord,
    TrackedFile, ValidationResult,
};
use crate::ocr::{Recognizer, TextExtractor};
use crate::pdf::FileValidator;
use crate::receipt::ReceiptParser;
use crate::storage::{BlobStore, CommitOutcome, Repository};

/// Result of a process request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// A new receipt record was stored.
    Created {
        receipt_id: ReceiptId,
        warnings: BTreeSet<ParseWarning>,
    },
    /// The file had already been processed; the existing record.
    ///
    /// Warnings from the original parse are stored on the record.
    AlreadyProcessed { receipt_id: ReceiptId },
}

impl ProcessOutcome {
    pub fn receipt_id(&self) -> ReceiptId {
        match self {
            ProcessOutcome::Created { receipt_id, .. }
            | ProcessOutcome::AlreadyProcessed { receipt_id } => *receipt_id,
        }
    }
}

/// Result of uploading, validating and (when valid) processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub file_id: FileId,
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<ProcessOutcome>,
}

/// Orchestrates validator, extractor and parser over injected collaborators.
pub struct IngestionPipeline {
    repository: Arc<dyn Repository>,
    blobs: Arc<dyn BlobStore>,
    validator: FileValidator,
    extractor: Arc<TextExtractor>,
    parser: Arc<ReceiptParser>,
    pool: ExtractionPool,
}

impl IngestionPipeline {
    pub fn new(
        repository: Arc<dyn Repository>,
        blobs: Arc<dyn BlobStore>,
        extractor: TextExtractor,
    ) -> Self {
        Self {
            repository,
            blobs,
            validator: FileValidator::new(),
            extractor: Arc::new(extractor),
            parser: Arc::new(ReceiptParser::default()),
            pool: ExtractionPool::default(),
        }
    }

    /// Build every stage from `config` around the given recognizer.
    pub fn from_config(
        repository: Arc<dyn Repository>,
        blobs: Arc<dyn BlobStore>,
        recognizer: Arc<dyn Recognizer>,
        config: &RcptConfig,
    ) -> Self {
        Self::new(
            repository,
            blobs,
            TextExtractor::from_config(recognizer, config),
        )
        .with_parser(ReceiptParser::new(config.parser.clone()))
        .with_pool(ExtractionPool::from_config(&config.pipeline))
    }

    pub fn with_parser(mut self, parser: ReceiptParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn with_pool(mut self, pool: ExtractionPool) -> Self {
        self.pool = pool;
        self
    }

    /// Store the bytes and register a new, unvalidated tracked file.
    pub fn upload(&self, filename: &str, data: &[u8]) -> Result<FileId> {
        let path = self.blobs.store(data)?;
        let id = self.repository.create_tracked_file(NewTrackedFile {
            filename: filename.to_string(),
            path,
        })?;
        info!(file_id = id.0, "Uploaded {} ({} bytes)", filename, data.len());
        Ok(id)
    }

    /// Validate a tracked file and persist the outcome.
    ///
    /// Validation runs once per file; later calls return the stored result.
    pub fn validate(&self, id: FileId) -> Result<ValidationResult> {
        let file = self.tracked_file(id)?;
        if let Some(stored) = file.validation() {
            debug!(file_id = id.0, "Already validated");
            return Ok(stored);
        }

        let data = self.blobs.read(&file.path)?;
        let result = self.validator.validate(&data);
        self.repository.update_validity(id, &result)?;

        match result.reason {
            None => info!(file_id = id.0, "File is valid"),
            Some(reason) => warn!(
                file_id = id.0,
                "File rejected: {} ({})",
                reason,
                result.detail.as_deref().unwrap_or("")
            ),
        }
        Ok(result)
    }

    /// Extract, parse and persist a receipt record for a valid file.
    ///
    /// Extraction failures leave the file unprocessed so the call can be
    /// retried. Concurrent calls for one file store exactly one record.
    pub async fn process(&self, id: FileId) -> Result<ProcessOutcome> {
        let start = Instant::now();
        let file = self.tracked_file(id)?;

        if file.processed {
            let receipt_id = self.existing_receipt(id)?;
            debug!(file_id = id.0, receipt_id = receipt_id.0, "Already processed");
            return Ok(ProcessOutcome::AlreadyProcessed { receipt_id });
        }
        if !file.is_valid() {
            return Err(StateError::NotValidated(id).into());
        }

        let data = self.blobs.read(&file.path)?;
        let extractor = self.extractor.clone();
        let pages = self.pool.run(move || extractor.extract(&data)).await?;
        debug!(file_id = id.0, "Extracted {} pages", pages.len());

        let texts: Vec<&str> = pages.iter().map(|p| p.text.as_str()).collect();
        let parsed = self.parser.parse(texts.as_slice());

        let record = NewReceiptRecord::from_parsed(&file, &parsed);
        let outcome = match self.repository.commit_receipt(record, parsed.items.clone())? {
            CommitOutcome::Created(receipt_id) => {
                info!(
                    file_id = id.0,
                    receipt_id = receipt_id.0,
                    "Processed in {}ms with {} warnings",
                    start.elapsed().as_millis(),
                    parsed.warnings.len()
                );
                ProcessOutcome::Created {
                    receipt_id,
                    warnings: parsed.warnings,
                }
            }
            CommitOutcome::AlreadyProcessed(receipt_id) => {
                debug!(file_id = id.0, receipt_id = receipt_id.0, "Lost processing race");
                ProcessOutcome::AlreadyProcessed { receipt_id }
            }
        };
        Ok(outcome)
    }

    /// Upload, validate and, if the document is valid, process it.
    ///
    /// Once the upload succeeds, any later failure is returned as
    /// [`RcptError::Ingest`] carrying the file id, so the caller can retry
    /// with [`process`](Self::process) instead of uploading again.
    pub async fn ingest(&self, filename: &str, data: &[u8]) -> Result<IngestOutcome> {
        let file_id = self.upload(filename, data)?;
        let validation = self
            .validate(file_id)
            .map_err(|e| e.during_ingest(file_id))?;
        let processed = if validation.valid {
            let outcome = self
                .process(file_id)
                .await
                .map_err(|e| e.during_ingest(file_id))?;
            Some(outcome)
        } else {
            None
        };
        Ok(IngestOutcome {
            file_id,
            validation,
            processed,
        })
    }

    pub fn tracked_file(&self, id: FileId) -> Result<TrackedFile> {
        self.repository
            .get_tracked_file(id)?
            .ok_or_else(|| StateError::FileNotFound(id).into())
    }

    pub fn get_receipt(&self, id: ReceiptId) -> Result<Option<ReceiptRecord>> {
        Ok(self.repository.get_receipt_record(id)?)
    }

    pub fn list_receipts(&self, skip: usize, limit: usize) -> Result<Vec<ReceiptRecord>> {
        Ok(self.repository.list_receipt_records(skip, limit)?)
    }

    fn existing_receipt(&self, id: FileId) -> Result<ReceiptId> {
        self.repository.receipt_for_file(id)?.ok_or_else(|| {
            StoreError::Invariant(format!("file {} is processed but has no receipt", id)).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RcptError;
    use crate::models::receipt::{InvalidReason, ValidityState};
    use crate::storage::{MemoryBlobStore, MemoryRepository};
    use crate::testing::{ScriptedRecognizer, scanned_pdf};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    const RECEIPT_TEXT: &str = "CORNER CAFE\n2024-03-02 08:15\nLATTE 4.50\nMUFFIN 3.25\nTOTAL 7.75";

    fn pipeline_with(recognizer: Arc<ScriptedRecognizer>) -> (IngestionPipeline, Arc<MemoryRepository>) {
        let repository = Arc::new(MemoryRepository::new());
        let pipeline = IngestionPipeline::new(
            repository.clone(),
            Arc::new(MemoryBlobStore::new()),
            TextExtractor::new(recognizer),
        );
        (pipeline, repository)
    }

    #[tokio::test]
    async fn test_ingest_creates_record() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant(RECEIPT_TEXT)));

        let outcome = pipeline.ingest("cafe.pdf", &scanned_pdf(1)).await.unwrap();
        assert!(outcome.validation.valid);
        let Some(ProcessOutcome::Created { receipt_id, warnings }) = outcome.processed else {
            panic!("expected a new record, got {:?}", outcome.processed);
        };
        assert!(warnings.is_empty());

        let record = pipeline.get_receipt(receipt_id).unwrap().unwrap();
        assert!(record.warnings.is_empty());
        assert_eq!(record.merchant.as_deref(), Some("CORNER CAFE"));
        assert_eq!(record.total_amount, Some(Decimal::new(775, 2)));
        assert_eq!(record.items.len(), 2);
        assert!(pipeline.tracked_file(outcome.file_id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let recognizer = Arc::new(ScriptedRecognizer::constant(RECEIPT_TEXT));
        let (pipeline, _) = pipeline_with(recognizer.clone());
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();
        pipeline.validate(id).unwrap();

        let first = pipeline.process(id).await.unwrap();
        let second = pipeline.process(id).await.unwrap();

        assert_eq!(
            second,
            ProcessOutcome::AlreadyProcessed {
                receipt_id: first.receipt_id()
            }
        );
        assert_eq!(pipeline.list_receipts(0, 10).unwrap().len(), 1);
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_warnings_outlive_first_process() {
        let recognizer = Arc::new(ScriptedRecognizer::constant("CORNER CAFE\nLATTE 4.50\nTOTAL 9.99"));
        let (pipeline, _) = pipeline_with(recognizer);
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();
        pipeline.validate(id).unwrap();

        let ProcessOutcome::Created { receipt_id, warnings } = pipeline.process(id).await.unwrap()
        else {
            panic!("expected a new record");
        };
        assert_eq!(
            warnings,
            BTreeSet::from([ParseWarning::NoDate, ParseWarning::TotalMismatch])
        );

        let again = pipeline.process(id).await.unwrap();
        assert_eq!(again, ProcessOutcome::AlreadyProcessed { receipt_id });
        let record = pipeline.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(record.warnings, warnings);
    }

    #[tokio::test]
    async fn test_invalid_file_is_not_processed() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant(RECEIPT_TEXT)));
        let id = pipeline.upload("notes.txt", b"just some text").unwrap();

        let result = pipeline.validate(id).unwrap();
        assert_eq!(result.reason, Some(InvalidReason::NotADocument));

        let err = pipeline.process(id).await.unwrap_err();
        assert!(matches!(err, RcptError::State(StateError::NotValidated(f)) if f == id));
        assert!(!pipeline.tracked_file(id).unwrap().processed);
        assert!(pipeline.list_receipts(0, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unvalidated_file_is_not_processed() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant(RECEIPT_TEXT)));
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();

        let err = pipeline.process(id).await.unwrap_err();
        assert!(matches!(err, RcptError::State(StateError::NotValidated(_))));
    }

    #[tokio::test]
    async fn test_validation_runs_once() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant("")));
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();

        let first = pipeline.validate(id).unwrap();
        let second = pipeline.validate(id).unwrap();
        assert!(first.valid);
        assert_eq!(second, ValidationResult::valid());
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant("")));
        assert!(matches!(
            pipeline.validate(FileId(42)),
            Err(RcptError::State(StateError::FileNotFound(_)))
        ));
        assert!(matches!(
            pipeline.process(FileId(42)).await,
            Err(RcptError::State(StateError::FileNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_process_creates_one_record() {
        let (pipeline, repository) =
            pipeline_with(Arc::new(ScriptedRecognizer::constant(RECEIPT_TEXT)));
        let pipeline = Arc::new(pipeline);
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();
        pipeline.validate(id).unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.process(id).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, ProcessOutcome::Created { .. }))
            .count();
        assert_eq!(created, 1);
        let receipt_id = outcomes[0].receipt_id();
        assert!(outcomes.iter().all(|o| o.receipt_id() == receipt_id));
        assert_eq!(repository.list_receipt_records(0, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_page_still_yields_record() {
        let (pipeline, _) = pipeline_with(Arc::new(ScriptedRecognizer::constant("")));

        let outcome = pipeline.ingest("blank.pdf", &scanned_pdf(1)).await.unwrap();
        let Some(ProcessOutcome::Created { receipt_id, warnings }) = outcome.processed else {
            panic!("expected a new record");
        };
        assert!(warnings.contains(&ParseWarning::NoText));

        let record = pipeline.get_receipt(receipt_id).unwrap().unwrap();
        assert_eq!(record.merchant, None);
        assert_eq!(record.total_amount, None);
        assert!(record.items.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_retriable() {
        let recognizer = Arc::new(ScriptedRecognizer::scripted(vec![Err("engine fault")]));
        let (pipeline, _) = pipeline_with(recognizer);
        let id = pipeline.upload("cafe.pdf", &scanned_pdf(1)).unwrap();
        pipeline.validate(id).unwrap();

        let err = pipeline.process(id).await.unwrap_err();
        assert!(err.is_retriable());
        assert!(matches!(
            err,
            RcptError::Extraction(crate::error::ExtractionError::RecognitionFailure { page: 1, .. })
        ));
        assert!(!pipeline.tracked_file(id).unwrap().processed);

        // The script is exhausted; the retry recognizes an empty page.
        let retry = pipeline.process(id).await.unwrap();
        assert!(matches!(retry, ProcessOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_file_for_retry() {
        let recognizer = Arc::new(ScriptedRecognizer::scripted(vec![Err("engine fault")]));
        let (pipeline, _) = pipeline_with(recognizer);

        let err = pipeline
            .ingest("cafe.pdf", &scanned_pdf(1))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        let id = err.file_id().unwrap();
        let file = pipeline.tracked_file(id).unwrap();
        assert_eq!(file.validity, ValidityState::Valid);
        assert!(!file.processed);

        let retry = pipeline.process(id).await.unwrap();
        assert!(matches!(retry, ProcessOutcome::Created { .. }));
        assert!(pipeline.tracked_file(id).unwrap().processed);
        // Retrying did not track the document a second time
        assert!(pipeline.tracked_file(FileId(id.0 + 1)).is_err());
    }
}
