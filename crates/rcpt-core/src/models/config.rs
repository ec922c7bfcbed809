//! Configuration structures for the ingestion pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the rcpt pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcptConfig {
    /// Recognition engine configuration.
    pub ocr: OcrConfig,

    /// PDF page access configuration.
    pub pdf: PdfConfig,

    /// Receipt field parsing configuration.
    pub parser: ParserConfig,

    /// Worker pool and deadlines.
    pub pipeline: PipelineConfig,

    /// Model configuration.
    pub models: ModelConfig,

    /// Persistence locations.
    pub storage: StorageConfig,
}

/// Which recognition engine backs the text extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// In-process ONNX models via `pure-onnx-ocr`.
    #[default]
    Onnx,
    /// External `tesseract` binary.
    Tesseract,
}

/// Recognition engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Engine used for page recognition.
    pub engine: EngineKind,

    /// Keep `[UNK]` markers emitted by the ONNX recognizer.
    pub keep_unk: bool,

    /// Maximum image dimension (longer side) handed to the engine.
    pub max_image_size: u32,

    /// Path to the tesseract binary.
    pub tesseract_path: String,

    /// Tesseract language pack.
    pub tesseract_language: String,

    /// Page segmentation modes to try; the longest output wins.
    pub tesseract_psm: Vec<u8>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Onnx,
            keep_unk: false,
            max_image_size: 2048,
            tesseract_path: "tesseract".to_string(),
            tesseract_language: "eng".to_string(),
            tesseract_psm: vec![4, 6, 3],
        }
    }
}

/// PDF page access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rasterizing pages before recognition.
    pub render_dpi: u32,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,

    /// Use the embedded text layer for pages that carry no raster image.
    pub text_layer_fallback: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            max_pages: 0,
            text_layer_fallback: true,
        }
    }
}

/// Receipt field parsing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// How many lines from the top of page one are merchant candidates.
    pub merchant_scan_lines: usize,

    /// Absolute slack between item sum and total.
    pub tolerance_absolute: Decimal,

    /// Relative slack between item sum and total, in percent of the total.
    pub tolerance_percent: Decimal,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            merchant_scan_lines: 6,
            tolerance_absolute: Decimal::new(1, 2),
            tolerance_percent: Decimal::ZERO,
        }
    }
}

impl ParserConfig {
    /// Largest accepted gap between item sum and `total`.
    pub fn tolerance_for(&self, total: Decimal) -> Decimal {
        let relative =
            total.abs().saturating_mul(self.tolerance_percent) / Decimal::ONE_HUNDRED;
        self.tolerance_absolute.max(relative)
    }
}

/// Worker pool and deadline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of extraction jobs allowed to run at once.
    pub workers: usize,

    /// Deadline for extracting one document, in seconds (0 = no deadline).
    pub recognition_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            recognition_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    pub fn recognition_timeout(&self) -> Option<Duration> {
        (self.recognition_timeout_secs > 0).then(|| Duration::from_secs(self.recognition_timeout_secs))
    }
}

/// Model file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
        }
    }
}

/// Persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database: PathBuf,

    /// Directory for uploaded file contents.
    pub blob_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("rcpt.db"),
            blob_dir: PathBuf::from("uploads"),
        }
    }
}

impl RcptConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.models.model_dir.join(model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RcptConfig =
            serde_json::from_str(r#"{"parser": {"tolerance_percent": "2"}}"#).unwrap();
        assert_eq!(config.parser.merchant_scan_lines, 6);
        assert_eq!(config.parser.tolerance_percent, Decimal::from(2));
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.ocr.engine, EngineKind::Onnx);
    }

    #[test]
    fn test_tolerance_takes_larger_component() {
        let config = ParserConfig {
            tolerance_absolute: Decimal::new(1, 2),
            tolerance_percent: Decimal::from(1),
            ..Default::default()
        };
        assert_eq!(
            config.tolerance_for(Decimal::from_str("200.00").unwrap()),
            Decimal::from(2)
        );
        assert_eq!(config.tolerance_for(Decimal::ZERO), Decimal::new(1, 2));
    }

    #[test]
    fn test_timeout_zero_disables() {
        let config = PipelineConfig {
            recognition_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.recognition_timeout().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = RcptConfig::default();
        config.pipeline.workers = 2;
        config.save(&path).unwrap();

        let loaded = RcptConfig::from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.workers, 2);
    }
}
