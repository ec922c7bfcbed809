//! Per-document text extraction: rasterize each page, then recognize it.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::models::config::{PdfConfig, RcptConfig};
use crate::pdf::{PdfExtractor, PdfProcessor};

use super::Recognizer;

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Output of the recognition engine.
    Recognized,
    /// The document's embedded text layer.
    TextLayer,
}

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// Page number (1-indexed).
    pub number: u32,
    pub text: String,
    pub source: TextSource,
}

/// Renders pages of a validated document and recognizes their text.
///
/// Every call re-renders from the given bytes; nothing is cached between
/// documents.
pub struct TextExtractor {
    recognizer: Arc<dyn Recognizer>,
    pdf: PdfConfig,
    max_image_size: u32,
}

impl TextExtractor {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self::from_config(recognizer, &RcptConfig::default())
    }

    pub fn from_config(recognizer: Arc<dyn Recognizer>, config: &RcptConfig) -> Self {
        Self {
            recognizer,
            pdf: config.pdf.clone(),
            max_image_size: config.ocr.max_image_size,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.pdf.render_dpi = dpi;
        self
    }

    pub fn with_text_layer_fallback(mut self, enabled: bool) -> Self {
        self.pdf.text_layer_fallback = enabled;
        self
    }

    /// Extract page texts in page order, one entry per page.
    pub fn extract(&self, data: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let start = Instant::now();
        let mut pdf = PdfExtractor::new().with_max_image_size(self.max_image_size);
        pdf.load(data).map_err(|e| ExtractionError::RenderFailure {
            page: 0,
            reason: e.to_string(),
        })?;

        let mut page_count = pdf.page_count();
        if self.pdf.max_pages > 0 && page_count as usize > self.pdf.max_pages {
            warn!(
                "Document has {} pages, processing first {}",
                page_count, self.pdf.max_pages
            );
            page_count = self.pdf.max_pages as u32;
        }

        let mut text_layer: Option<Vec<String>> = None;
        let mut pages = Vec::with_capacity(page_count as usize);

        for number in 1..=page_count {
            let rendered = pdf
                .render_page(number, self.pdf.render_dpi)
                .map_err(|e| ExtractionError::RenderFailure {
                    page: number,
                    reason: e.to_string(),
                })?;

            let page = match rendered {
                Some(image) => {
                    let text = self.recognizer.recognize(&image).map_err(|e| {
                        ExtractionError::RecognitionFailure {
                            page: number,
                            reason: e.to_string(),
                        }
                    })?;
                    PageText {
                        number,
                        text,
                        source: TextSource::Recognized,
                    }
                }
                None if self.pdf.text_layer_fallback => {
                    if text_layer.is_none() {
                        let texts = pdf.page_texts().map_err(|e| ExtractionError::RenderFailure {
                            page: number,
                            reason: e.to_string(),
                        })?;
                        text_layer = Some(texts);
                    }
                    let text = text_layer
                        .as_ref()
                        .and_then(|texts| texts.get(number as usize - 1))
                        .cloned()
                        .unwrap_or_default();
                    debug!(page = number, "Using embedded text layer");
                    PageText {
                        number,
                        text,
                        source: TextSource::TextLayer,
                    }
                }
                None => {
                    return Err(ExtractionError::RenderFailure {
                        page: number,
                        reason: "page has no raster content".to_string(),
                    });
                }
            };
            pages.push(page);
        }

        info!(
            "Extracted {} pages with {} in {}ms",
            pages.len(),
            self.recognizer.name(),
            start.elapsed().as_millis()
        );
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixturePage, ScriptedRecognizer, build_pdf, scanned_pdf};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pages_in_order() {
        let recognizer = Arc::new(ScriptedRecognizer::scripted(vec![
            Ok("page one"),
            Ok("page two"),
        ]));
        let extractor = TextExtractor::new(recognizer.clone()).with_dpi(72);

        let pages = extractor.extract(&scanned_pdf(2)).unwrap();
        assert_eq!(
            pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(),
            vec!["page one", "page two"]
        );
        assert_eq!(pages[1].number, 2);
        assert_eq!(recognizer.calls(), 2);
    }

    #[test]
    fn test_recognition_fault_propagates() {
        let recognizer = Arc::new(ScriptedRecognizer::scripted(vec![
            Ok("fine"),
            Err("engine crashed"),
        ]));
        let extractor = TextExtractor::new(recognizer).with_dpi(72);

        let err = extractor.extract(&scanned_pdf(3)).unwrap_err();
        match err {
            ExtractionError::RecognitionFailure { page, reason } => {
                assert_eq!(page, 2);
                assert!(reason.contains("engine crashed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unloadable_document_is_render_failure() {
        let extractor = TextExtractor::new(Arc::new(ScriptedRecognizer::constant("x")));
        let err = extractor.extract(b"%PDF-1.4 broken").unwrap_err();
        assert_eq!(err.code(), "RENDER_FAILURE");
    }

    #[test]
    fn test_page_without_image_uses_text_layer() {
        let recognizer = Arc::new(ScriptedRecognizer::constant("unused"));
        let extractor = TextExtractor::new(recognizer.clone());

        let pages = extractor.extract(&build_pdf(&[FixturePage::Blank])).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source, TextSource::TextLayer);
        assert!(pages[0].text.trim().is_empty());
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn test_page_without_image_fails_without_fallback() {
        let extractor = TextExtractor::new(Arc::new(ScriptedRecognizer::constant("x")))
            .with_text_layer_fallback(false);
        let err = extractor
            .extract(&build_pdf(&[FixturePage::Blank]))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::RenderFailure { page: 1, .. }));
    }

    #[test]
    fn test_max_pages_limits_output() {
        let mut config = RcptConfig::default();
        config.pdf.max_pages = 1;
        config.pdf.render_dpi = 72;
        let extractor =
            TextExtractor::from_config(Arc::new(ScriptedRecognizer::constant("p")), &config);

        let pages = extractor.extract(&scanned_pdf(3)).unwrap();
        assert_eq!(pages.len(), 1);
    }
}
