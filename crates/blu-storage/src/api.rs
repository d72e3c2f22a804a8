//! B2 API
//!
//! One trait method per remote call. `HttpB2Api` speaks the native B2 v2
//! protocol over reqwest; tests substitute the generated mock.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blu_core::B2Config;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::model::{
    AuthorizeResponse, Credential, DeleteFileVersionRequest, GetUploadUrlRequest,
    GetUploadUrlResponse, UploadFileResponse, UploadSlot, UploadedFile,
};

const AUTHORIZE_PATH: &str = "/b2api/v2/b2_authorize_account";
const GET_UPLOAD_URL_PATH: &str = "/b2api/v2/b2_get_upload_url";
const DELETE_FILE_VERSION_PATH: &str = "/b2api/v2/b2_delete_file_version";

/// Lets the backend pick the content type from the file extension
pub const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

const FILE_NAME_HEADER: &str = "X-Bz-File-Name";
const CONTENT_SHA1_HEADER: &str = "X-Bz-Content-Sha1";

// Unreserved characters plus '/', which B2 keeps as a path separator
const FILE_NAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Remote object storage calls
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait B2Api: Send + Sync {
    /// Exchange the application key for an account credential
    async fn authorize(&self) -> StorageResult<Credential>;

    /// Acquire an upload destination for the credential's bucket
    async fn get_upload_url(&self, credential: &Credential) -> StorageResult<UploadSlot>;

    async fn upload_file(
        &self,
        slot: &UploadSlot,
        file_name: &str,
        data: Bytes,
    ) -> StorageResult<UploadedFile>;

    async fn delete_file_version(
        &self,
        credential: &Credential,
        file_name: &str,
        file_id: &str,
    ) -> StorageResult<()>;

    async fn download_file(
        &self,
        credential: &Credential,
        bucket_name: &str,
        file_name: &str,
    ) -> StorageResult<Bytes>;
}

/// Percent-encode a file name for headers and download paths
pub fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, FILE_NAME_ENCODE).to_string()
}

/// Lowercase hex SHA-1 of an upload body
pub fn content_sha1(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// `{download_url}/file/{bucket}/{encoded name}`
pub fn download_file_url(download_url: &str, bucket_name: &str, file_name: &str) -> String {
    format!(
        "{}/file/{}/{}",
        download_url.trim_end_matches('/'),
        bucket_name,
        encode_file_name(file_name)
    )
}

pub fn basic_auth(key_id: &str, application_key: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", key_id, application_key)))
}

/// Anything but 200 is a failure carrying the response body
async fn expect_ok(response: Response, fail: fn(String) -> StorageError) -> StorageResult<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(fail(format!("{}: {}", status, body)))
}

/// B2 native API over HTTP
pub struct HttpB2Api {
    client: reqwest::Client,
    api_root: String,
    key_id: String,
    application_key: String,
}

impl fmt::Debug for HttpB2Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpB2Api")
            .field("api_root", &self.api_root)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl HttpB2Api {
    pub fn new(
        api_root: impl Into<String>,
        key_id: impl Into<String>,
        application_key: impl Into<String>,
    ) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("blutography/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_root: api_root.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            application_key: application_key.into(),
        })
    }

    pub fn from_config(config: &B2Config) -> StorageResult<Self> {
        Self::new(&config.api_root, &config.key_id, &config.application_key)
    }
}

#[async_trait]
impl B2Api for HttpB2Api {
    #[instrument(skip(self), fields(api_root = %self.api_root))]
    async fn authorize(&self) -> StorageResult<Credential> {
        let url = format!("{}{}", self.api_root, AUTHORIZE_PATH);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, basic_auth(&self.key_id, &self.application_key))
            .send()
            .await
            .map_err(|e| StorageError::Auth(e.to_string()))?;

        let response = expect_ok(response, StorageError::Auth).await?;
        let body: AuthorizeResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        debug!(account_id = %body.account_id, api_url = %body.api_url, "Authorized");
        body.into_credential()
    }

    #[instrument(skip(self, credential), fields(bucket_id = %credential.bucket_id))]
    async fn get_upload_url(&self, credential: &Credential) -> StorageResult<UploadSlot> {
        let url = format!("{}{}", credential.api_url, GET_UPLOAD_URL_PATH);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &credential.auth_token)
            .json(&GetUploadUrlRequest {
                bucket_id: &credential.bucket_id,
            })
            .send()
            .await
            .map_err(|e| StorageError::Slot(e.to_string()))?;

        let response = expect_ok(response, StorageError::Slot).await?;
        let body: GetUploadUrlResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        Ok(body.into())
    }

    #[instrument(skip(self, slot, data), fields(size = data.len()))]
    async fn upload_file(
        &self,
        slot: &UploadSlot,
        file_name: &str,
        data: Bytes,
    ) -> StorageResult<UploadedFile> {
        let sha1 = content_sha1(&data);
        let response = self
            .client
            .post(&slot.upload_url)
            .header(AUTHORIZATION, &slot.auth_token)
            .header(FILE_NAME_HEADER, encode_file_name(file_name))
            .header(CONTENT_TYPE, AUTO_CONTENT_TYPE)
            .header(CONTENT_SHA1_HEADER, sha1)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        let response = expect_ok(response, StorageError::Upload).await?;
        let body: UploadFileResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        Ok(body.into())
    }

    #[instrument(skip(self, credential))]
    async fn delete_file_version(
        &self,
        credential: &Credential,
        file_name: &str,
        file_id: &str,
    ) -> StorageResult<()> {
        let url = format!("{}{}", credential.api_url, DELETE_FILE_VERSION_PATH);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &credential.auth_token)
            .json(&DeleteFileVersionRequest { file_name, file_id })
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        expect_ok(response, StorageError::Delete).await?;
        Ok(())
    }

    #[instrument(skip(self, credential))]
    async fn download_file(
        &self,
        credential: &Credential,
        bucket_name: &str,
        file_name: &str,
    ) -> StorageResult<Bytes> {
        let url = download_file_url(&credential.download_url, bucket_name, file_name);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &credential.auth_token)
            .send()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;

        let response = expect_ok(response, StorageError::Download).await?;
        response
            .bytes()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))
    }
}
