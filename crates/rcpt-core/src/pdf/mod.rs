//! PDF processing module.

mod extractor;
mod validator;

pub use extractor::PdfExtractor;
pub use validator::{FileValidator, PDF_MAGIC};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// End-of-file marker closing the last revision of a document.
const EOF_MARKER: &[u8] = b"%%EOF";

/// The document up to and including its last `%%EOF` line.
///
/// Scanners and mail gateways sometimes append bytes after the marker,
/// which hides the trailer from readers that only search the file tail.
/// Returns `None` when no marker is present.
pub(crate) fn through_last_eof(data: &[u8]) -> Option<&[u8]> {
    let start = data
        .windows(EOF_MARKER.len())
        .rposition(|w| w == EOF_MARKER)?;
    let mut end = start + EOF_MARKER.len();
    if data.get(end) == Some(&b'\r') {
        end += 1;
    }
    if data.get(end) == Some(&b'\n') {
        end += 1;
    }
    Some(&data[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_through_last_eof() {
        assert_eq!(
            through_last_eof(b"%PDF-1.4\n%%EOF\nupdate\n%%EOF\r\njunk"),
            Some(&b"%PDF-1.4\n%%EOF\nupdate\n%%EOF\r\n"[..])
        );
        assert_eq!(through_last_eof(b"%PDF-1.4\n%%EOF"), Some(&b"%PDF-1.4\n%%EOF"[..]));
        assert_eq!(through_last_eof(b"%PDF-1.4 no marker"), None);
    }
}

/// Trait for PDF page access implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Rasterize a page at the specified DPI.
    ///
    /// Returns `Ok(None)` when the page carries no raster content.
    fn render_page(&self, page: u32, dpi: u32) -> Result<Option<DynamicImage>>;

    /// Embedded text layer, one entry per page.
    fn page_texts(&self) -> Result<Vec<String>>;
}
