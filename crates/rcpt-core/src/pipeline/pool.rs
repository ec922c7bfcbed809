//! Bounded pool for CPU-bound extraction jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::models::config::PipelineConfig;

/// Runs blocking jobs off the async executor, at most `workers` at a time.
///
/// A job's permit is held by the blocking thread itself, so a job that
/// outlives its deadline still counts against the pool until it finishes.
#[derive(Clone)]
pub struct ExtractionPool {
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl ExtractionPool {
    pub fn new(workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.workers, config.recognition_timeout())
    }

    /// Run `job` on the blocking pool.
    ///
    /// An exceeded deadline or a panicking job is reported as a recognition
    /// failure.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ExtractionError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ExtractionError> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExtractionError::RecognitionFailure {
                page: 0,
                reason: format!("worker pool closed: {}", e),
            })?;
        debug!("Extraction job started ({} permits left)", self.permits.available_permits());

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Extraction exceeded its deadline of {:?}", limit);
                    return Err(ExtractionError::RecognitionFailure {
                        page: 0,
                        reason: format!("timed out after {:?}", limit),
                    });
                }
            },
            None => handle.await,
        };

        joined.map_err(|e| ExtractionError::RecognitionFailure {
            page: 0,
            reason: format!("extraction worker failed: {}", e),
        })?
    }
}

impl Default for ExtractionPool {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
