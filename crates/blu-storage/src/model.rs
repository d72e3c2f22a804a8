//! Storage Models
//!
//! Credentials and upload slots handed out by the B2 API, plus the JSON
//! shapes exchanged with it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Account-level authorization
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub account_id: String,
    /// Base URL for API calls other than authorize
    pub api_url: String,
    pub auth_token: String,
    /// Base URL for file downloads
    pub download_url: String,
    /// Bucket the application key is restricted to
    pub bucket_id: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("bucket_id", &self.bucket_id)
            .finish_non_exhaustive()
    }
}

/// Pre-authorized upload destination
#[derive(Clone, PartialEq, Eq)]
pub struct UploadSlot {
    pub upload_url: String,
    pub auth_token: String,
}

impl fmt::Debug for UploadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSlot")
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

/// A stored file version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Remote identifier assigned by the backend
    pub file_id: String,
    pub file_name: String,
}

/// Outcome of the authorize, upload, delete connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub success: bool,
    /// Last stage reached: the failing one, or `complete`
    pub stage: String,
    pub message: String,
}

impl DiagnosticReport {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            stage: "complete".to_string(),
            message: message.into(),
        }
    }

    pub fn failed(stage: &str, error: &StorageError) -> Self {
        Self {
            success: false,
            stage: stage.to_string(),
            message: error.to_string(),
        }
    }
}

// Wire formats

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorizeResponse {
    pub account_id: String,
    pub api_url: String,
    pub authorization_token: String,
    pub download_url: String,
    #[serde(default)]
    pub allowed: AllowedScope,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AllowedScope {
    pub bucket_id: Option<String>,
}

impl AuthorizeResponse {
    pub fn into_credential(self) -> StorageResult<Credential> {
        let bucket_id = self.allowed.bucket_id.ok_or_else(|| {
            StorageError::InvalidResponse("application key is not restricted to a bucket".into())
        })?;

        Ok(Credential {
            account_id: self.account_id,
            api_url: self.api_url,
            auth_token: self.authorization_token,
            download_url: self.download_url,
            bucket_id,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetUploadUrlRequest<'a> {
    pub bucket_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetUploadUrlResponse {
    pub upload_url: String,
    pub authorization_token: String,
}

impl From<GetUploadUrlResponse> for UploadSlot {
    fn from(response: GetUploadUrlResponse) -> Self {
        Self {
            upload_url: response.upload_url,
            auth_token: response.authorization_token,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadFileResponse {
    pub file_id: String,
    pub file_name: String,
}

impl From<UploadFileResponse> for UploadedFile {
    fn from(response: UploadFileResponse) -> Self {
        Self {
            file_id: response.file_id,
            file_name: response.file_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteFileVersionRequest<'a> {
    pub file_name: &'a str,
    pub file_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_response_to_credential() {
        let json = r#"{
            "accountId": "acc-1",
            "apiUrl": "https://api005.backblazeb2.com",
            "authorizationToken": "4_token",
            "downloadUrl": "https://f005.backblazeb2.com",
            "recommendedPartSize": 100000000,
            "allowed": { "bucketId": "bkt-9", "bucketName": "photos", "capabilities": ["writeFiles"] }
        }"#;

        let response: AuthorizeResponse = serde_json::from_str(json).unwrap();
        let credential = response.into_credential().unwrap();

        assert_eq!(credential.account_id, "acc-1");
        assert_eq!(credential.api_url, "https://api005.backblazeb2.com");
        assert_eq!(credential.auth_token, "4_token");
        assert_eq!(credential.bucket_id, "bkt-9");
    }

    #[test]
    fn test_unrestricted_key_is_rejected() {
        let json = r#"{
            "accountId": "acc-1",
            "apiUrl": "https://api005.backblazeb2.com",
            "authorizationToken": "4_token",
            "downloadUrl": "https://f005.backblazeb2.com",
            "allowed": { "bucketId": null }
        }"#;

        let response: AuthorizeResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_credential(),
            Err(StorageError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let slot = UploadSlot {
            upload_url: "https://pod-000.backblaze.com/b2api/v2/b2_upload_file".into(),
            auth_token: "secret-token".into(),
        };
        assert!(!format!("{:?}", slot).contains("secret-token"));
    }

    #[test]
    fn test_delete_request_field_names() {
        let body = serde_json::to_value(DeleteFileVersionRequest {
            file_name: "a.jpg",
            file_id: "4_z123",
        })
        .unwrap();
        assert_eq!(body["fileName"], "a.jpg");
        assert_eq!(body["fileId"], "4_z123");
    }
}
