//! Gallery errors

use blu_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Gallery item not found: {0}")]
    NotFound(String),
    #[error("Background worker unavailable: {0}")]
    WorkerUnavailable(String),
}

pub type GalleryResult<T> = Result<T, GalleryError>;
