//! # blu-gallery
//!
//! Photo ingest for Blutography: EXIF metadata and previews computed on a
//! bounded background pool, originals stored remotely, records kept in a
//! catalog store.

pub mod batch;
pub mod catalog;
pub mod error;
pub mod ingest;
pub mod store;
pub mod worker;

pub use batch::BatchCompletion;
pub use catalog::{CatalogStore, GalleryItem, MemoryCatalogStore};
pub use error::{GalleryError, GalleryResult};
pub use ingest::{GalleryIngest, IngestedPhoto};
pub use store::ObjectStore;
pub use worker::WorkerPool;
