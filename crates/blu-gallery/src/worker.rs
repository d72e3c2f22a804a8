//! Bounded pool for CPU-bound image work

use std::sync::Arc;

use blu_core::WorkerConfig;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::error::{GalleryError, GalleryResult};

/// Runs blocking jobs on the blocking thread pool, at most `size` at a time.
///
/// Callers wait for a permit before their job is spawned, so a burst of
/// uploads queues here instead of starting unbounded decode work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.max_concurrent_jobs)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running job
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, job: F) -> GalleryResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GalleryError::WorkerUnavailable(e.to_string()))?;
        debug!(available = self.permits.available_permits(), "Worker permit acquired");

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Background job did not complete");
            GalleryError::WorkerUnavailable(e.to_string())
        })
    }
}
