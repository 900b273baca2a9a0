use std::sync::Arc;

use crate::{
    error::PipelineError,
    pipeline::GenerationPipeline,
    storage::{Artifacts, CatalogStore, RecordStore},
};

/// Shared handler state. Every field is a cheaply cloned handle.
#[derive(Clone)]
pub struct AppState {
    pub artifacts: Arc<dyn Artifacts>,
    pub catalog: Arc<dyn CatalogStore>,
    pub records: Arc<dyn RecordStore>,
    /// `None` while provider credentials are missing.
    pub pipeline: Option<Arc<GenerationPipeline>>,
    pub missing_settings: Vec<&'static str>,
}

impl AppState {
    pub fn pipeline(&self) -> Result<Arc<GenerationPipeline>, PipelineError> {
        self.pipeline.clone().ok_or_else(|| {
            PipelineError::Configuration(format!(
                "image generation is not configured, set {}",
                self.missing_settings.join(" and ")
            ))
        })
    }
}
