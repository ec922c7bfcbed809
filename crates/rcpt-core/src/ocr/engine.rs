//! Recognizer construction from configuration.

use std::sync::Arc;

use tracing::info;

use crate::error::OcrError;
use crate::models::config::{EngineKind, RcptConfig};

use super::{Recognizer, TesseractEngine};

/// Build the recognizer selected by `config.ocr.engine`.
pub fn create_recognizer(config: &RcptConfig) -> Result<Arc<dyn Recognizer>, OcrError> {
    match config.ocr.engine {
        EngineKind::Onnx => create_onnx(config),
        EngineKind::Tesseract => {
            let engine = TesseractEngine::new(&config.ocr);
            if !engine.is_available() {
                return Err(OcrError::ModelLoad(format!(
                    "tesseract not found at '{}'",
                    config.ocr.tesseract_path
                )));
            }
            info!("Using tesseract recognizer");
            Ok(Arc::new(engine))
        }
    }
}

#[cfg(feature = "native")]
fn create_onnx(config: &RcptConfig) -> Result<Arc<dyn Recognizer>, OcrError> {
    Ok(Arc::new(super::PureOcrEngine::from_config(config)?))
}

#[cfg(not(feature = "native"))]
fn create_onnx(_config: &RcptConfig) -> Result<Arc<dyn Recognizer>, OcrError> {
    Err(OcrError::ModelLoad(
        "onnx engine requires the `native` feature".to_string(),
    ))
}
