//! # blu-core
//!
//! Core building blocks shared by the Blutography crates:
//! - Configuration types and loading
//! - Configuration errors

pub mod config;
pub mod error;

pub use config::{AppConfig, B2Config, PreviewConfig, WorkerConfig};
pub use error::{ConfigError, ConfigResult};
