//! Gallery Ingest Service
//!
//! Takes an uploaded photo through metadata extraction, preview generation
//! and remote storage, then records it in the catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use blu_core::AppConfig;
use blu_imaging::{ExifMetadataExtractor, ImageMetadata, PreviewGenerator};
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::batch::BatchCompletion;
use crate::catalog::{CatalogStore, GalleryItem};
use crate::error::{GalleryError, GalleryResult};
use crate::store::ObjectStore;
use crate::worker::WorkerPool;

/// Result of ingesting one photo
#[derive(Debug, Clone)]
pub struct IngestedPhoto {
    /// The catalog record
    pub item: GalleryItem,
    /// Preview bytes for the caller to persist under `item.preview_name`
    pub preview: Bytes,
}

impl IngestedPhoto {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.item.metadata
    }
}

/// Ingest service
pub struct GalleryIngest<C: CatalogStore> {
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<C>,
    workers: WorkerPool,
    uploads: Arc<Semaphore>,
    extractor: ExifMetadataExtractor,
    previews: PreviewGenerator,
}

impl<C: CatalogStore + 'static> GalleryIngest<C> {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<C>,
        workers: WorkerPool,
        previews: PreviewGenerator,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            storage,
            catalog,
            workers,
            uploads: Arc::new(Semaphore::new(upload_concurrency.max(1))),
            extractor: ExifMetadataExtractor::new(),
            previews,
        }
    }

    pub fn from_config(storage: Arc<dyn ObjectStore>, catalog: Arc<C>, config: &AppConfig) -> Self {
        Self::new(
            storage,
            catalog,
            WorkerPool::from_config(&config.worker),
            PreviewGenerator::from_config(&config.preview),
            config.worker.upload_concurrency,
        )
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    /// Ingest one photo.
    ///
    /// Metadata and preview run on the worker pool while the original
    /// uploads. Nothing is recorded if the upload fails.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn ingest(&self, file_name: &str, data: Bytes) -> GalleryResult<IngestedPhoto> {
        let extractor = self.extractor;
        let metadata_input = data.clone();
        let metadata_job = self.workers.run(move || extractor.extract(&metadata_input));

        let previews = self.previews.clone();
        let preview_input = data.clone();
        let preview_file = file_name.to_string();
        let preview_job = self
            .workers
            .run(move || previews.generate_preview(preview_input, &preview_file));

        let upload = async {
            let _permit = self
                .uploads
                .acquire()
                .await
                .map_err(|e| GalleryError::WorkerUnavailable(e.to_string()))?;
            self.storage.upload(file_name, data).await.map_err(GalleryError::from)
        };

        let (metadata, preview, uploaded) = tokio::join!(metadata_job, preview_job, upload);
        let uploaded = uploaded.map_err(|e| {
            error!(error = %e, "Upload of original failed");
            e
        })?;
        let metadata = metadata?;
        let preview = preview?;

        let item = GalleryItem {
            id: Uuid::new_v4().to_string(),
            name: display_name(file_name),
            file_name: uploaded.file_name,
            remote_id: uploaded.file_id,
            preview_name: PreviewGenerator::preview_name(file_name),
            metadata,
            uploaded_at: Utc::now(),
        };
        self.catalog.insert(item.clone()).await?;

        info!(
            id = %item.id,
            remote_id = %item.remote_id,
            camera = %item.metadata.camera_model,
            width = item.metadata.width,
            height = item.metadata.height,
            preview_kb = preview.len() / 1024,
            "Photo ingested"
        );

        Ok(IngestedPhoto { item, preview })
    }

    /// Ingest several photos concurrently.
    ///
    /// Resolves once every file has finished; results are keyed by file name.
    pub async fn ingest_batch(
        self: Arc<Self>,
        files: Vec<(String, Bytes)>,
    ) -> HashMap<String, GalleryResult<IngestedPhoto>> {
        let total = files.len();
        let (completion, done) = BatchCompletion::new(total);

        for (file_name, data) in files {
            let ingest = Arc::clone(&self);
            let completion = Arc::clone(&completion);
            tokio::spawn(async move {
                let result = ingest.ingest(&file_name, data).await;
                if let Err(e) = &result {
                    warn!(file = %file_name, error = %e, "Ingest failed");
                }
                if !completion.complete(file_name, result) {
                    debug!(remaining = completion.remaining(), "Ingest finished, batch pending");
                }
            });
        }
        drop(completion);

        let results = done.await.unwrap_or_default();
        let failed = results.values().filter(|r| r.is_err()).count();
        info!(total, failed, "Batch ingest finished");
        results
    }

    /// Catalog record and original bytes for `id`
    #[instrument(skip(self))]
    pub async fn fetch_original(&self, id: &str) -> GalleryResult<(GalleryItem, Bytes)> {
        let item = self
            .catalog
            .get(id)
            .await?
            .ok_or_else(|| GalleryError::NotFound(id.to_string()))?;

        let data = self.storage.download(&item.file_name).await?;
        Ok((item, data))
    }
}

fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalogStore;
    use crate::store::MockObjectStore;
    use async_trait::async_trait;
    use blu_storage::{StorageError, StorageResult, UploadedFile};
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    fn jpeg(width: u32, height: u32) -> Bytes {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 85)
            .encode_image(&img)
            .unwrap();
        Bytes::from(buf)
    }

    fn uploaded(name: &str) -> UploadedFile {
        UploadedFile {
            file_id: format!("4_{}", name),
            file_name: name.to_string(),
        }
    }

    fn service(store: impl ObjectStore + 'static) -> GalleryIngest<MemoryCatalogStore> {
        GalleryIngest::new(
            Arc::new(store),
            Arc::new(MemoryCatalogStore::new()),
            WorkerPool::new(2),
            PreviewGenerator::default(),
            5,
        )
    }

    #[tokio::test]
    async fn test_ingest_records_item() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .withf(|name, data| name == "trip/sunset.jpg" && data.len() > 4)
            .times(1)
            .returning(|name, _| Ok(uploaded(name)));
        let ingest = service(store);

        let photo = ingest.ingest("trip/sunset.jpg", jpeg(64, 32)).await.unwrap();

        assert_eq!(photo.item.name, "sunset");
        assert_eq!(photo.item.remote_id, "4_trip/sunset.jpg");
        assert_eq!(photo.item.preview_name, "sunset_preview.jpg");
        assert_eq!((photo.metadata().width, photo.metadata().height), (64, 32));
        assert_eq!(photo.metadata().camera_model, "unknown");
        assert_eq!(&photo.preview[..2], &[0xFF, 0xD8]);

        let stored = ingest.catalog().get(photo.id()).await.unwrap().unwrap();
        assert_eq!(stored, photo.item);
    }

    #[tokio::test]
    async fn test_failed_upload_records_nothing() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .times(1)
            .returning(|_, _| Err(StorageError::Upload("500; first attempt: 401".into())));
        let ingest = service(store);

        let result = ingest.ingest("a.jpg", jpeg(8, 8)).await;

        assert!(matches!(result, Err(GalleryError::Storage(StorageError::Upload(_)))));
        assert!(ingest.catalog().all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_jpeg_preview_is_original() {
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|name, _| Ok(uploaded(name)));
        let ingest = service(store);
        let png = Bytes::from_static(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");

        let photo = ingest.ingest("logo.png", png.clone()).await.unwrap();

        assert_eq!(photo.preview, png);
        assert_eq!(*photo.metadata(), ImageMetadata::default());
    }

    #[tokio::test]
    async fn test_fetch_original() {
        let original = jpeg(16, 16);
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|name, _| Ok(uploaded(name)));
        let body = original.clone();
        store
            .expect_download()
            .withf(|name| name == "harbor.jpg")
            .times(1)
            .returning(move |_| Ok(body.clone()));
        let ingest = service(store);

        let photo = ingest.ingest("harbor.jpg", original.clone()).await.unwrap();
        let (item, data) = ingest.fetch_original(photo.id()).await.unwrap();

        assert_eq!(item.file_name, "harbor.jpg");
        assert_eq!(data, original);
    }

    #[tokio::test]
    async fn test_fetch_unknown_id() {
        let mut store = MockObjectStore::new();
        store.expect_download().never();
        let ingest = service(store);

        assert!(matches!(
            ingest.fetch_original("missing").await,
            Err(GalleryError::NotFound(_))
        ));
    }

    /// Store whose uploads finish in reverse submission order
    struct ReverseOrderStore;

    #[async_trait]
    impl ObjectStore for ReverseOrderStore {
        async fn upload(&self, name: &str, _data: Bytes) -> StorageResult<UploadedFile> {
            let index: u64 = name.trim_end_matches(".jpg").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(60 - index * 10)).await;
            if index == 2 {
                return Err(StorageError::Upload("503".into()));
            }
            Ok(uploaded(name))
        }

        async fn download(&self, name: &str) -> StorageResult<Bytes> {
            Err(StorageError::Download(format!("404: {}", name)))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_of_five_resolves_with_every_result() {
        let ingest = Arc::new(service(ReverseOrderStore));
        let files = (1..=5)
            .map(|i| (format!("{}.jpg", i), jpeg(16, 16)))
            .collect();

        let results = ingest.clone().ingest_batch(files).await;

        assert_eq!(results.len(), 5);
        assert!(matches!(results["2.jpg"], Err(GalleryError::Storage(_))));
        assert_eq!(results["5.jpg"].as_ref().unwrap().item.remote_id, "4_5.jpg");
        assert_eq!(ingest.catalog().all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let ingest = Arc::new(service(ReverseOrderStore));
        assert!(ingest.ingest_batch(Vec::new()).await.is_empty());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("IMG_0042.JPG"), "IMG_0042");
        assert_eq!(display_name("a/b/c.jpeg"), "c");
        assert_eq!(display_name("noext"), "noext");
    }
}
