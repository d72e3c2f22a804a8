//! Remote storage as seen by the ingest service

use async_trait::async_trait;
use blu_storage::{ObjectStorageClient, StorageResult, UploadedFile};
use bytes::Bytes;

/// Upload and fetch originals by file name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<UploadedFile>;

    async fn download(&self, name: &str) -> StorageResult<Bytes>;
}

#[async_trait]
impl ObjectStore for ObjectStorageClient {
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<UploadedFile> {
        ObjectStorageClient::upload(self, name, data).await
    }

    async fn download(&self, name: &str) -> StorageResult<Bytes> {
        ObjectStorageClient::download(self, name).await
    }
}
