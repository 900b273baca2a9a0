use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One clothing choice made by the client: which category, which item in it,
/// and the color to render it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySelection {
    #[serde(rename = "category_id", alias = "categoryId")]
    pub category_id: String,
    #[serde(rename = "selected_clothing_id", alias = "clothingItemId")]
    pub clothing_item_id: String,
    #[serde(rename = "selected_color", alias = "colorName")]
    pub color_name: String,
}

/// Input of a single pipeline run. Lives only for the duration of the run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: Uuid,
    /// Public URL of the uploaded face image.
    pub face_image_url: String,
    /// Storage key of the uploaded face image, used to read its bytes.
    pub face_image_key: String,
    pub author_id: String,
    pub category_selections: Vec<CategorySelection>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(
        face_image_key: String,
        face_image_url: String,
        author_id: String,
        category_selections: Vec<CategorySelection>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            face_image_url,
            face_image_key,
            author_id,
            category_selections,
            created_at: Utc::now(),
        }
    }
}

/// The committed result of a successful pipeline run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationItem {
    pub id: Uuid,
    pub face_image_url: String,
    pub target_image_url: String,
    pub result_image_url: String,
    pub timestamp: i64,
    pub author_id: String,
    pub item_name: String,
    pub clothing_selections: Vec<CategorySelection>,
}

impl GenerationItem {
    pub fn has_all_images(&self) -> bool {
        !self.face_image_url.trim().is_empty()
            && !self.target_image_url.trim().is_empty()
            && !self.result_image_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceSwapStatus {
    Submitted,
    Polling,
    Completed,
    Failed,
}

/// A face-swap job as tracked by the client between submission and result.
#[derive(Debug, Clone)]
pub struct FaceSwapJob {
    pub job_id: String,
    pub status: FaceSwapStatus,
    pub submitted_at: tokio::time::Instant,
    pub result_image_url: Option<String>,
}

impl FaceSwapJob {
    pub fn submitted(job_id: String) -> Self {
        Self {
            job_id,
            status: FaceSwapStatus::Submitted,
            submitted_at: tokio::time::Instant::now(),
            result_image_url: None,
        }
    }
}
