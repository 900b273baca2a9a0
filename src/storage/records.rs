use async_trait::async_trait;

use crate::{error::PipelineError, models::GenerationItem, storage::LocalFileStorage};

const RECORD_DIR: &str = "records/generated_items";

/// Durable collection of committed [`GenerationItem`]s. Append-only.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, item: &GenerationItem) -> Result<(), PipelineError>;

    /// Newest first, optionally restricted to one author.
    async fn list(
        &self,
        author_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<GenerationItem>, PipelineError>;
}

/// One JSON document per record under `records/generated_items/`.
#[derive(Clone, Debug)]
pub struct FileRecordStore {
    storage: LocalFileStorage,
}

impl FileRecordStore {
    pub fn new(storage: LocalFileStorage) -> Self {
        Self { storage }
    }

    fn record_key(item: &GenerationItem) -> String {
        format!("{RECORD_DIR}/{:020}_{}.json", item.timestamp.max(0), item.id)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn insert(&self, item: &GenerationItem) -> Result<(), PipelineError> {
        if !item.has_all_images() {
            return Err(PipelineError::persistence(format!(
                "refusing to store generation {} without all image urls",
                item.id
            )));
        }
        let key = Self::record_key(item);
        let payload = serde_json::to_vec_pretty(item).map_err(PipelineError::persistence)?;
        self.storage
            .put_new(&key, &payload)
            .await
            .map_err(|err| PipelineError::persistence(format!("write {key} failed: {err}")))
    }

    async fn list(
        &self,
        author_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<GenerationItem>, PipelineError> {
        let keys = self
            .storage
            .list(RECORD_DIR)
            .await
            .map_err(PipelineError::persistence)?;
        let limit = limit.unwrap_or(usize::MAX);
        let mut records = Vec::new();
        for key in keys.into_iter().filter(|key| key.ends_with(".json")) {
            if records.len() >= limit {
                break;
            }
            let Some(bytes) = self.storage.get(&key).await.map_err(PipelineError::persistence)?
            else {
                continue;
            };
            match serde_json::from_slice::<GenerationItem>(&bytes) {
                Ok(record) => {
                    if author_id.is_some_and(|author| record.author_id != author) {
                        continue;
                    }
                    records.push(record);
                }
                Err(err) => tracing::warn!(key = %key, error = %err, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}
