//! Storage errors

use thiserror::Error;

/// Failures of the remote object storage calls
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Could not acquire upload slot: {0}")]
    Slot(String),
    #[error("Upload with cached slot failed: {0}")]
    UploadStale(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Download failed: {0}")]
    Download(String),
    #[error("Delete failed: {0}")]
    Delete(String),
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StorageError {
    /// Stage name reported by the diagnostic sequence
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Auth(_) => "authorize",
            Self::Slot(_) => "get_upload_url",
            Self::UploadStale(_) | Self::Upload(_) => "upload",
            Self::Download(_) => "download",
            Self::Delete(_) => "delete",
            Self::Http(_) => "transport",
            Self::InvalidResponse(_) => "response",
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
