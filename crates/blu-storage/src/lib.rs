//! # blu-storage
//!
//! Backblaze B2 object storage for Blutography.
//!
//! ## Features
//!
//! - Account credential and upload slot caching with TTLs
//! - Uploads with a single fresh-slot retry
//! - Downloads by file name
//! - End-to-end connectivity diagnostic
//!
//! ## Example
//!
//! ```ignore
//! use blu_storage::ObjectStorageClient;
//!
//! let client = ObjectStorageClient::from_config(&config.b2)?;
//! let file = client.upload("IMG_0001.jpg", bytes).await?;
//! let original = client.download("IMG_0001.jpg").await?;
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod error;
pub mod model;

pub use api::{B2Api, HttpB2Api};
pub use cache::{CredentialCache, TtlEntry, UploadSlotCache};
pub use client::{CacheTtls, ObjectStorageClient};
pub use error::{StorageError, StorageResult};
pub use model::{Credential, DiagnosticReport, UploadSlot, UploadedFile};
