//! Gallery Catalog
//!
//! Records of ingested photos, keyed by id. Durable persistence belongs to
//! the caller; the store trait is the seam.

use async_trait::async_trait;
use blu_imaging::ImageMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GalleryResult;

/// One photo in the gallery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: String,
    /// Display name
    pub name: String,
    /// Name of the original in the bucket
    pub file_name: String,
    /// Remote file id of the original
    pub remote_id: String,
    pub preview_name: String,
    pub metadata: ImageMetadata,
    pub uploaded_at: DateTime<Utc>,
}

/// Gallery record store
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert(&self, item: GalleryItem) -> GalleryResult<()>;

    async fn get(&self, id: &str) -> GalleryResult<Option<GalleryItem>>;

    /// All items in insertion order
    async fn all(&self) -> GalleryResult<Vec<GalleryItem>>;
}

/// In-memory catalog
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    items: RwLock<Vec<GalleryItem>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn insert(&self, item: GalleryItem) -> GalleryResult<()> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> GalleryResult<Option<GalleryItem>> {
        let items = self.items.read().await;
        Ok(items.iter().find(|i| i.id == id).cloned())
    }

    async fn all(&self) -> GalleryResult<Vec<GalleryItem>> {
        Ok(self.items.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str) -> GalleryItem {
        GalleryItem {
            id: id.to_string(),
            name: name.to_string(),
            file_name: format!("{}.jpg", name),
            remote_id: format!("4_{}", id),
            preview_name: format!("{}_preview.jpg", name),
            metadata: ImageMetadata::default(),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_all() {
        let store = MemoryCatalogStore::new();
        store.insert(item("1", "dunes")).await.unwrap();
        store.insert(item("2", "harbor")).await.unwrap();

        assert_eq!(store.get("2").await.unwrap().unwrap().name, "harbor");
        assert!(store.get("3").await.unwrap().is_none());

        let names: Vec<_> = store.all().await.unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["dunes", "harbor"]);
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let store = MemoryCatalogStore::new();
        store.insert(item("1", "draft")).await.unwrap();
        store.insert(item("1", "final")).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "final");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(item("1", "dunes")).unwrap();
        assert_eq!(json["fileName"], "dunes.jpg");
        assert_eq!(json["previewName"], "dunes_preview.jpg");
        assert_eq!(json["metadata"]["camera_model"], "unknown");
    }
}
