//! Recognition through an external `tesseract` binary.

use std::process::Command;

use image::DynamicImage;
use tracing::{debug, trace};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::Recognizer;

/// Runs `tesseract <image> stdout` once per configured page segmentation
/// mode and keeps the longest output.
pub struct TesseractEngine {
    binary: String,
    language: String,
    psm_modes: Vec<u8>,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.tesseract_language.clone(),
            psm_modes: config.tesseract_psm.clone(),
        }
    }

    /// Check that the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, image_path: &std::path::Path, psm: Option<u8>) -> Result<String, OcrError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image_path.as_os_str())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language);
        if let Some(psm) = psm {
            command.arg("--psm").arg(psm.to_string());
        }

        let output = command.output().map_err(|e| {
            OcrError::ModelLoad(format!(
                "failed to run tesseract (path='{}'): {}",
                self.binary, e
            ))
        })?;

        if !output.status.success() {
            return Err(OcrError::Recognition(format!(
                "tesseract exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Recognizer for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| OcrError::Recognition(format!("failed to create temp dir: {}", e)))?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save_with_format(&image_path, image::ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        let modes: Vec<Option<u8>> = if self.psm_modes.is_empty() {
            vec![None]
        } else {
            self.psm_modes.iter().copied().map(Some).collect()
        };

        let mut best: Option<String> = None;
        let mut last_error = None;
        for psm in modes {
            match self.run(&image_path, psm) {
                Ok(text) => {
                    trace!("tesseract psm {:?} produced {} chars", psm, text.trim().len());
                    if best.as_ref().is_none_or(|b| text.trim().len() > b.trim().len()) {
                        best = Some(text);
                    }
                }
                Err(e) => {
                    debug!("tesseract psm {:?} failed: {}", psm, e);
                    last_error = Some(e);
                }
            }
        }

        match (best, last_error) {
            (Some(text), _) => Ok(text.trim_end().to_string()),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_reports_model_load() {
        let config = OcrConfig {
            tesseract_path: "/nonexistent/tesseract-binary".to_string(),
            ..Default::default()
        };
        let engine = TesseractEngine::new(&config);
        assert!(!engine.is_available());

        let image = DynamicImage::new_luma8(4, 4);
        let err = engine.recognize(&image).unwrap_err();
        assert!(matches!(err, OcrError::ModelLoad(_)));
    }
}
