//! Credential and upload slot caches
//!
//! Each cache is a single entry behind one async mutex. The lock is held
//! while a refresh is in flight, so concurrent callers wait for the
//! refreshed entry instead of issuing their own remote call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::B2Api;
use crate::error::StorageResult;
use crate::model::{Credential, UploadSlot};

/// A cached value and when it was acquired
#[derive(Debug, Clone)]
pub struct TtlEntry<T> {
    value: T,
    acquired_at: Instant,
}

impl<T> TtlEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            acquired_at: Instant::now(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn age(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Caches the account authorization
pub struct CredentialCache {
    api: Arc<dyn B2Api>,
    ttl: Duration,
    entry: Mutex<Option<TtlEntry<Credential>>>,
}

impl CredentialCache {
    pub fn new(api: Arc<dyn B2Api>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Cached credential, re-authorizing once it is older than the TTL.
    ///
    /// A failed refresh leaves the stale entry in place; it is not consulted
    /// again until a refresh succeeds.
    pub async fn get_credential(&self) -> StorageResult<Credential> {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            debug!(age_secs = cached.age().as_secs(), "Credential cache hit");
            return Ok(cached.value().clone());
        }

        debug!(stale = entry.is_some(), "Credential cache miss, authorizing");
        let credential = self.api.authorize().await.map_err(|e| {
            warn!(error = %e, "Authorization failed");
            e
        })?;

        info!(account_id = %credential.account_id, "Credential refreshed");
        *entry = Some(TtlEntry::new(credential.clone()));
        Ok(credential)
    }
}

/// Caches the upload destination for the single configured bucket
pub struct UploadSlotCache {
    api: Arc<dyn B2Api>,
    ttl: Duration,
    entry: Mutex<Option<TtlEntry<UploadSlot>>>,
}

impl UploadSlotCache {
    pub fn new(api: Arc<dyn B2Api>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub async fn get_slot(&self, credential: &Credential) -> StorageResult<UploadSlot> {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            debug!(age_secs = cached.age().as_secs(), "Upload slot cache hit");
            return Ok(cached.value().clone());
        }

        debug!("Upload slot cache miss, requesting upload URL");
        let slot = self.api.get_upload_url(credential).await.map_err(|e| {
            warn!(error = %e, "Could not get upload URL");
            e
        })?;

        info!(upload_url = %slot.upload_url, "Upload slot refreshed");
        *entry = Some(TtlEntry::new(slot.clone()));
        Ok(slot)
    }

    /// Drop the cached slot regardless of age
    pub async fn invalidate(&self) {
        let mut entry = self.entry.lock().await;
        if entry.take().is_some() {
            debug!("Upload slot invalidated");
        }
    }
}
