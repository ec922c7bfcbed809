//! Error types for the rcpt-core library.

use thiserror::Error;

use crate::models::receipt::FileId;

/// Main error type for the rcpt library.
#[derive(Error, Debug)]
pub enum RcptError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Page text extraction error (rendering or recognition).
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// File lifecycle error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Repository or blob store error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A step after upload failed; the file stays tracked under `file_id`.
    #[error("file {file_id}: {source}")]
    Ingest {
        file_id: FileId,
        #[source]
        source: Box<RcptError>,
    },
}

impl RcptError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            RcptError::Extraction(e) => e.is_retriable(),
            RcptError::Ingest { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// The tracked file an ingest failure left behind, if any.
    pub fn file_id(&self) -> Option<FileId> {
        match self {
            RcptError::Ingest { file_id, .. } => Some(*file_id),
            _ => None,
        }
    }

    pub(crate) fn during_ingest(self, file_id: FileId) -> Self {
        RcptError::Ingest {
            file_id,
            source: Box::new(self),
        }
    }
}

/// Errors related to PDF access.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract the embedded text layer.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to produce a raster image for a page.
    #[error("failed to render page: {0}")]
    Render(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors raised by a recognition engine.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models or locate the engine.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Failures while turning a validated document into page texts.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// A page could not be rasterized.
    #[error("RENDER_FAILURE on page {page}: {reason}")]
    RenderFailure { page: u32, reason: String },

    /// The recognition engine faulted or timed out.
    #[error("RECOGNITION_FAILURE on page {page}: {reason}")]
    RecognitionFailure { page: u32, reason: String },
}

impl ExtractionError {
    /// Extraction failures leave the file untouched, so the orchestrator may retry.
    pub fn is_retriable(&self) -> bool {
        true
    }

    /// Stable code for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractionError::RenderFailure { .. } => "RENDER_FAILURE",
            ExtractionError::RecognitionFailure { .. } => "RECOGNITION_FAILURE",
        }
    }
}

/// Illegal lifecycle transitions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    /// No tracked file with this id.
    #[error("file {0} not found")]
    FileNotFound(FileId),

    /// Processing attempted on a file that is not validated as valid.
    #[error("file {0} is not validated")]
    NotValidated(FileId),
}

/// Errors from the storage collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Blob path is unknown to the store.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// A stored row violates a lifecycle invariant.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A stored value could not be decoded.
    #[error("corrupt stored value: {0}")]
    Decode(String),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the rcpt library.
pub type Result<T> = std::result::Result<T, RcptError>;
