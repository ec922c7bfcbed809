//! Shared setup: configuration lookup and pipeline construction.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::DynamicImage;
use tracing::debug;

use rcpt_core::error::OcrError;
use rcpt_core::models::config::RcptConfig;
use rcpt_core::ocr::{Recognizer, create_recognizer};
use rcpt_core::pipeline::IngestionPipeline;
use rcpt_core::storage::{FsBlobStore, SqliteRepository};

/// Config file used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcpt")
        .join("config.json")
}

/// The explicit `--config` path, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration; a missing default file means built-in defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<RcptConfig> {
    match explicit {
        Some(path) => Ok(RcptConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(RcptConfig::from_file(&path)?)
            } else {
                Ok(RcptConfig::default())
            }
        }
    }
}

/// Open the configured database and blob directory.
///
/// The recognition engine is only loaded once a page actually needs it, so
/// commands that never recognize text work without model files.
pub fn open_pipeline(config: &RcptConfig) -> anyhow::Result<IngestionPipeline> {
    if let Some(parent) = config.storage.database.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let repository = SqliteRepository::open(&config.storage.database)?;
    let blobs = FsBlobStore::new(&config.storage.blob_dir)?;
    debug!(
        "Using database {} and blobs in {}",
        config.storage.database.display(),
        config.storage.blob_dir.display()
    );

    Ok(IngestionPipeline::from_config(
        Arc::new(repository),
        Arc::new(blobs),
        Arc::new(LazyRecognizer::new(config.clone())),
        config,
    ))
}

/// Recognizer built from config on first use.
struct LazyRecognizer {
    config: RcptConfig,
    engine: OnceLock<Result<Arc<dyn Recognizer>, String>>,
}

impl LazyRecognizer {
    fn new(config: RcptConfig) -> Self {
        Self {
            config,
            engine: OnceLock::new(),
        }
    }
}

impl Recognizer for LazyRecognizer {
    fn name(&self) -> &str {
        match self.engine.get() {
            Some(Ok(engine)) => engine.name(),
            _ => "unloaded",
        }
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let engine = self.engine.get_or_init(|| {
            create_recognizer(&self.config).map_err(|e| e.to_string())
        });
        match engine {
            Ok(engine) => engine.recognize(image),
            Err(reason) => Err(OcrError::ModelLoad(reason.clone())),
        }
    }
}
