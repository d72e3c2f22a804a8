//! Configuration types and loading
//!
//! Values are layered: built-in defaults, an optional config file, then
//! `BLUTOGRAPHY__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable the deployed service reads the B2 application key from
pub const APPLICATION_KEY_ENV: &str = "DB_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Object storage configuration
    #[serde(default)]
    pub b2: B2Config,

    /// Preview generation configuration
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Background worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct B2Config {
    /// Application key id
    pub key_id: String,
    /// Application key secret
    pub application_key: String,
    /// Bucket holding gallery originals
    pub bucket_name: String,
    /// Root host for account authorization
    pub api_root: String,
    /// How long an account authorization is reused
    pub credential_ttl_secs: u64,
    /// How long an upload URL is reused
    pub slot_ttl_secs: u64,
}

impl Default for B2Config {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            application_key: String::new(),
            bucket_name: String::new(),
            api_root: "https://api.backblazeb2.com".to_string(),
            credential_ttl_secs: 20 * 60 * 60,
            slot_ttl_secs: 12 * 60 * 60,
        }
    }
}

impl B2Config {
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn slot_ttl(&self) -> Duration {
        Duration::from_secs(self.slot_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Sources wider or taller than this are halved before re-encoding
    pub large_image_threshold: u32,
    /// JPEG quality used for previews (1-100)
    pub quality: u8,
    /// Directory callers write preview files into
    pub directory: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            large_image_threshold: 8000,
            quality: 90,
            directory: "previews".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on concurrently running CPU-bound image jobs
    pub max_concurrent_jobs: usize,
    /// Upper bound on concurrently running uploads within one batch
    pub upload_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            upload_concurrency: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus `BLUTOGRAPHY__*` environment variables
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("config/blutography").required(false)),
        };

        // BLUTOGRAPHY__B2__BUCKET_NAME -> b2.bucket_name
        let settings = builder
            .add_source(
                config::Environment::with_prefix("BLUTOGRAPHY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.apply_application_key_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from plain environment variables only
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(key_id) = std::env::var("B2_KEY_ID") {
            config.b2.key_id = key_id;
        }
        if let Ok(bucket) = std::env::var("B2_BUCKET_NAME") {
            config.b2.bucket_name = bucket;
        }
        if let Ok(root) = std::env::var("B2_API_ROOT") {
            config.b2.api_root = root;
        }
        if let Some(ttl) = parse_env("B2_CREDENTIAL_TTL_SECS")? {
            config.b2.credential_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("B2_SLOT_TTL_SECS")? {
            config.b2.slot_ttl_secs = ttl;
        }
        config.apply_application_key_env();

        if let Some(threshold) = parse_env("PREVIEW_LARGE_IMAGE_THRESHOLD")? {
            config.preview.large_image_threshold = threshold;
        }
        if let Some(quality) = parse_env("PREVIEW_QUALITY")? {
            config.preview.quality = quality;
        }
        if let Ok(dir) = std::env::var("PREVIEW_DIRECTORY") {
            config.preview.directory = dir;
        }

        if let Some(jobs) = parse_env("WORKER_MAX_CONCURRENT_JOBS")? {
            config.worker.max_concurrent_jobs = jobs;
        }
        if let Some(uploads) = parse_env("UPLOAD_CONCURRENCY")? {
            config.worker.upload_concurrency = uploads;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_application_key_env(&mut self) {
        if self.b2.application_key.is_empty() {
            if let Ok(key) = std::env::var(APPLICATION_KEY_ENV) {
                self.b2.application_key = key;
            }
        }
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=100).contains(&self.preview.quality) {
            return Err(ConfigError::invalid(
                "preview.quality",
                format!("{} is outside 1-100", self.preview.quality),
            ));
        }
        if self.preview.large_image_threshold == 0 {
            return Err(ConfigError::invalid("preview.large_image_threshold", "must be positive"));
        }
        if self.worker.max_concurrent_jobs == 0 {
            return Err(ConfigError::invalid("worker.max_concurrent_jobs", "must be positive"));
        }
        if self.worker.upload_concurrency == 0 {
            return Err(ConfigError::invalid("worker.upload_concurrency", "must be positive"));
        }
        if self.b2.slot_ttl_secs > self.b2.credential_ttl_secs {
            tracing::warn!(
                slot_ttl_secs = self.b2.slot_ttl_secs,
                credential_ttl_secs = self.b2.credential_ttl_secs,
                "Upload slot TTL exceeds credential TTL"
            );
        }
        Ok(())
    }

    /// Storage settings, failing when the backend is not configured
    pub fn require_b2(&self) -> ConfigResult<&B2Config> {
        if self.b2.key_id.is_empty() {
            return Err(ConfigError::MissingValue("b2.key_id"));
        }
        if self.b2.bucket_name.is_empty() {
            return Err(ConfigError::MissingValue("b2.bucket_name"));
        }
        if self.b2.application_key.is_empty() {
            return Err(ConfigError::MissingValue("b2.application_key"));
        }
        Ok(&self.b2)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        Err(_) => Ok(None),
    }
}
