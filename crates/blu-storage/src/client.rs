//! Object Storage Client
//!
//! Composes the credential and upload slot caches with the B2 API. Uploads
//! get one retry with a fresh slot; downloads and deletes are single calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blu_core::B2Config;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::api::{B2Api, HttpB2Api};
use crate::cache::{CredentialCache, UploadSlotCache};
use crate::error::{StorageError, StorageResult};
use crate::model::{Credential, DiagnosticReport, UploadedFile};

/// Lifetimes of the cached credential and upload slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub credential: Duration,
    pub slot: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            credential: Duration::from_secs(20 * 3600),
            slot: Duration::from_secs(12 * 3600),
        }
    }
}

impl From<&B2Config> for CacheTtls {
    fn from(config: &B2Config) -> Self {
        Self {
            credential: config.credential_ttl(),
            slot: config.slot_ttl(),
        }
    }
}

/// Client for the single configured bucket
pub struct ObjectStorageClient {
    api: Arc<dyn B2Api>,
    bucket_name: String,
    credentials: CredentialCache,
    slots: UploadSlotCache,
}

impl ObjectStorageClient {
    pub fn new(api: Arc<dyn B2Api>, bucket_name: impl Into<String>, ttls: CacheTtls) -> Self {
        Self {
            credentials: CredentialCache::new(api.clone(), ttls.credential),
            slots: UploadSlotCache::new(api.clone(), ttls.slot),
            api,
            bucket_name: bucket_name.into(),
        }
    }

    /// Client talking to B2 over HTTP with the configured key and TTLs
    pub fn from_config(config: &B2Config) -> StorageResult<Self> {
        let api = HttpB2Api::from_config(config)?;
        info!(bucket = %config.bucket_name, "Object storage client initialized");
        Ok(Self::new(Arc::new(api), &config.bucket_name, config.into()))
    }

    /// Current account credential, from cache when fresh
    pub async fn credential(&self) -> StorageResult<Credential> {
        self.credentials.get_credential().await
    }

    /// Store `data` under `name`, returning the remote file id.
    ///
    /// A failed attempt drops the cached slot and retries once with a fresh
    /// slot from the same credential.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(&self, name: &str, data: Bytes) -> StorageResult<UploadedFile> {
        let credential = self.credentials.get_credential().await?;
        let slot = self.slots.get_slot(&credential).await?;

        let first = match self.api.upload_file(&slot, name, data.clone()).await {
            Ok(file) => {
                info!(file_id = %file.file_id, "Upload complete");
                return Ok(file);
            }
            Err(e) => StorageError::UploadStale(e.to_string()),
        };

        warn!(error = %first, "Upload failed, retrying with a fresh slot");
        self.slots.invalidate().await;
        let slot = self.slots.get_slot(&credential).await?;

        match self.api.upload_file(&slot, name, data).await {
            Ok(file) => {
                info!(file_id = %file.file_id, "Upload complete after retry");
                Ok(file)
            }
            Err(retry) => {
                error!(error = %retry, stage = retry.stage(), "Upload retry failed");
                Err(StorageError::Upload(format!("{}; first attempt: {}", retry, first)))
            }
        }
    }

    /// Fetch a stored file by name. No retry.
    #[instrument(skip(self))]
    pub async fn download(&self, name: &str) -> StorageResult<Bytes> {
        let credential = self.credentials.get_credential().await?;
        let data = self
            .api
            .download_file(&credential, &self.bucket_name, name)
            .await
            .map_err(|e| {
                warn!(error = %e, "Download failed");
                e
            })?;

        debug!(size = data.len(), "Download complete");
        Ok(data)
    }

    /// Best-effort removal of one file version
    #[instrument(skip(self, credential))]
    pub async fn delete(
        &self,
        credential: &Credential,
        name: &str,
        remote_id: &str,
    ) -> StorageResult<()> {
        self.api
            .delete_file_version(credential, name, remote_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "Delete failed");
                e
            })
    }

    /// Upload several files with at most `concurrency` in flight.
    ///
    /// Results are keyed by file name and arrive in completion order.
    pub async fn upload_batch(
        &self,
        files: Vec<(String, Bytes)>,
        concurrency: usize,
    ) -> HashMap<String, StorageResult<UploadedFile>> {
        let total = files.len();
        let results: HashMap<_, _> = stream::iter(files)
            .map(|(name, data)| async move {
                let result = self.upload(&name, data).await;
                (name, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let failed = results.values().filter(|r| r.is_err()).count();
        info!(total, failed, "Batch upload finished");
        results
    }

    /// Authorize, acquire a slot, upload a ping object and delete it again.
    ///
    /// Talks to the API directly, bypassing the caches.
    pub async fn run_diagnostic(&self) -> DiagnosticReport {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let name = format!("ping_{}.txt", now);
        let body = Bytes::from(format!("Ping from Blutography Backend at {}", now));

        let report = match self.diagnostic_sequence(&name, body).await {
            Ok(file_id) => DiagnosticReport::passed(format!(
                "Uploaded and deleted {} ({}) in bucket {}",
                name, file_id, self.bucket_name
            )),
            Err((stage, e)) => DiagnosticReport::failed(stage, &e),
        };

        if report.success {
            info!(stage = %report.stage, "Diagnostic passed");
        } else {
            error!(stage = %report.stage, message = %report.message, "Diagnostic failed");
        }
        report
    }

    async fn diagnostic_sequence(
        &self,
        name: &str,
        body: Bytes,
    ) -> Result<String, (&'static str, StorageError)> {
        let credential = self.api.authorize().await.map_err(|e| ("authorize", e))?;
        debug!("Diagnostic: authorized");

        let slot = self
            .api
            .get_upload_url(&credential)
            .await
            .map_err(|e| ("get_upload_url", e))?;
        debug!("Diagnostic: upload slot acquired");

        let file = self
            .api
            .upload_file(&slot, name, body)
            .await
            .map_err(|e| ("upload", e))?;
        debug!(file_id = %file.file_id, "Diagnostic: ping uploaded");

        self.delete(&credential, name, &file.file_id)
            .await
            .map_err(|e| ("delete", e))?;

        Ok(file.file_id)
    }
}
