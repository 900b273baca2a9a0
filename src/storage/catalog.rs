//! Read-only clothing catalog.
//!
//! `catalog/categories.json` holds the category list; each category's items
//! live in `catalog/<collection>.json` where the collection name is derived
//! from the category name by [`collection_name`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{
    error::PipelineError,
    models::{ClothingCategory, ClothingItem},
    storage::LocalFileStorage,
};

const CATALOG_DIR: &str = "catalog";

/// `"Button Up"` -> `"button_up_items"`.
pub fn collection_name(category_name: &str) -> String {
    let mut slug = String::with_capacity(category_name.len() + 6);
    let mut pending_separator = false;
    for ch in category_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug.push_str("_items");
    slug
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<ClothingCategory>, PipelineError>;

    async fn list_items(
        &self,
        category: &ClothingCategory,
    ) -> Result<Vec<ClothingItem>, PipelineError>;

    async fn find_category(&self, id: &str) -> Result<Option<ClothingCategory>, PipelineError> {
        Ok(self
            .list_categories()
            .await?
            .into_iter()
            .find(|category| category.id == id))
    }

    async fn find_item(
        &self,
        category: &ClothingCategory,
        item_id: &str,
    ) -> Result<Option<ClothingItem>, PipelineError> {
        Ok(self
            .list_items(category)
            .await?
            .into_iter()
            .find(|item| item.id == item_id))
    }
}

/// Catalog read from JSON documents in [`LocalFileStorage`].
#[derive(Clone, Debug)]
pub struct JsonCatalog {
    storage: LocalFileStorage,
}

impl JsonCatalog {
    pub fn new(storage: LocalFileStorage) -> Self {
        Self { storage }
    }

    async fn read_collection<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, PipelineError> {
        let key = format!("{CATALOG_DIR}/{name}.json");
        let Some(bytes) = self.storage.get(&key).await.map_err(PipelineError::persistence)? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&bytes)
            .map_err(|err| PipelineError::persistence(format!("parse {key} failed: {err}")))
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn list_categories(&self) -> Result<Vec<ClothingCategory>, PipelineError> {
        self.read_collection("categories").await
    }

    async fn list_items(
        &self,
        category: &ClothingCategory,
    ) -> Result<Vec<ClothingItem>, PipelineError> {
        self.read_collection(&collection_name(&category.name)).await
    }
}
