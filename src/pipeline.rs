//! The generation pipeline: selections -> prompt -> target image -> face swap
//! -> committed record.
//!
//! Stages run strictly in order and every failure ends the run. Artifacts
//! persisted before a failure, the uploaded face included, are left where they
//! are and listed in the returned [`PipelineFailure`]; no record is written for
//! a failed run, so the record store alone decides whether a generation exists.
//!
//! Nothing here deduplicates: submitting the same selections twice produces
//! two request ids, two sets of artifacts, two records and two rounds of
//! provider spend.

use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::{PipelineError, PipelineFailure, Stage},
    faceswap::FaceSwapper,
    models::{GenerationItem, GenerationRequest},
    openai::ImageGenerator,
    selection::SelectionResolver,
    storage::{Artifacts, Bucket, CatalogStore, RecordStore},
};

#[derive(Clone)]
pub struct GenerationPipeline {
    resolver: SelectionResolver,
    generator: Arc<dyn ImageGenerator>,
    swapper: Arc<dyn FaceSwapper>,
    artifacts: Arc<dyn Artifacts>,
    records: Arc<dyn RecordStore>,
}

struct RunState {
    request_id: Uuid,
    stage: Stage,
    job_id: Option<String>,
    persisted: Vec<String>,
}

impl RunState {
    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        tracing::info!(stage = %stage, "stage started");
    }

    fn into_failure(self, error: PipelineError) -> PipelineFailure {
        PipelineFailure {
            request_id: self.request_id,
            stage: self.stage,
            error,
            job_id: self.job_id,
            orphaned_artifacts: self.persisted,
        }
    }
}

impl GenerationPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        generator: Arc<dyn ImageGenerator>,
        swapper: Arc<dyn FaceSwapper>,
        artifacts: Arc<dyn Artifacts>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            resolver: SelectionResolver::new(catalog),
            generator,
            swapper,
            artifacts,
            records,
        }
    }

    /// Runs one request to completion or failure. There is no mid-run cancellation.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationItem, PipelineFailure> {
        let span = tracing::info_span!(
            "generation",
            request_id = %request.request_id,
            author_id = %request.author_id
        );
        async move {
            let mut state = RunState {
                request_id: request.request_id,
                stage: Stage::Resolving,
                job_id: None,
                persisted: vec![request.face_image_key.clone()],
            };
            match self.execute(&request, &mut state).await {
                Ok(item) => {
                    tracing::info!(result = %item.result_image_url, "generation committed");
                    Ok(item)
                }
                Err(error) => {
                    let failure = state.into_failure(error);
                    // The face upload is always listed; anything beyond it was written by this run.
                    if failure.orphaned_artifacts.len() <= 1 {
                        tracing::warn!(
                            stage = %failure.stage,
                            error = %failure.error,
                            orphaned = ?failure.orphaned_artifacts,
                            "generation failed"
                        );
                    } else {
                        tracing::error!(
                            stage = %failure.stage,
                            error = %failure.error,
                            job_id = failure.job_id.as_deref().unwrap_or("-"),
                            orphaned = ?failure.orphaned_artifacts,
                            "generation failed after persisting artifacts"
                        );
                    }
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        state: &mut RunState,
    ) -> Result<GenerationItem, PipelineError> {
        state.enter(Stage::Resolving);
        let resolution = self.resolver.resolve(&request.category_selections).await?;

        state.enter(Stage::Prompting);
        let prompt = resolution.prompt;
        tracing::debug!(prompt = %prompt, "prompt built");

        state.enter(Stage::GeneratingTarget);
        let remote_target_url = self.generator.generate(&prompt).await?;

        state.enter(Stage::PersistingTarget);
        let target = self
            .artifacts
            .persist_remote(Bucket::Targets, &remote_target_url)
            .await?;
        state.persisted.push(target.key.clone());

        state.enter(Stage::Swapping);
        let target_bytes = self.artifacts.read(&target.key).await?;
        let face_bytes = self.artifacts.read(&request.face_image_key).await?;
        let mut job = self.swapper.submit(&target_bytes, &face_bytes).await?;
        state.job_id = Some(job.job_id.clone());

        state.enter(Stage::AwaitingSwap);
        let remote_result_url = self.swapper.await_result(&mut job).await?;

        state.enter(Stage::PersistingResult);
        let result = self
            .artifacts
            .persist_remote(Bucket::Results, &remote_result_url)
            .await?;
        state.persisted.push(result.key.clone());

        state.enter(Stage::Committing);
        let item = GenerationItem {
            id: request.request_id,
            face_image_url: request.face_image_url.clone(),
            target_image_url: target.url,
            result_image_url: result.url,
            timestamp: Utc::now().timestamp_millis(),
            author_id: request.author_id.clone(),
            item_name: resolution.display_name,
            clothing_selections: request.category_selections.clone(),
        };
        if !item.has_all_images() {
            return Err(PipelineError::persistence(
                "generation is missing an image url",
            ));
        }
        self.records.insert(&item).await?;

        state.enter(Stage::Done);
        Ok(item)
    }
}
