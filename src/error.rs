use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Errors raised by the generation pipeline and the components it drives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Bad or missing client input. No external call has been made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced catalog entry does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A third-party provider failed or answered with an unexpected shape.
    #[error("{provider} error: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    /// Download, filesystem or record store failure.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The server is missing something it needs to talk to a provider.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// States of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Resolving,
    Prompting,
    GeneratingTarget,
    PersistingTarget,
    Swapping,
    AwaitingSwap,
    PersistingResult,
    Committing,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Resolving => "RESOLVING",
            Stage::Prompting => "PROMPTING",
            Stage::GeneratingTarget => "GENERATING_TARGET",
            Stage::PersistingTarget => "PERSISTING_TARGET",
            Stage::Swapping => "SWAPPING",
            Stage::AwaitingSwap => "AWAITING_SWAP",
            Stage::PersistingResult => "PERSISTING_RESULT",
            Stage::Committing => "COMMITTING",
            Stage::Done => "DONE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal `FAILED(stage, cause)` state of a pipeline run.
#[derive(Debug, Clone, thiserror::Error)]
#[error("generation {request_id} failed at {stage}: {error}")]
pub struct PipelineFailure {
    pub request_id: Uuid,
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
    /// Face-swap job id, once one has been assigned.
    pub job_id: Option<String>,
    /// Storage keys persisted by this run before it failed. Left in place.
    pub orphaned_artifacts: Vec<String>,
}

/// HTTP-facing error type for handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Failure(#[from] PipelineFailure),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

fn classify(error: &PipelineError) -> (StatusCode, &'static str) {
    match error {
        PipelineError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        PipelineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        PipelineError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        PipelineError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
        PipelineError::Configuration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "code": "BAD_REQUEST" }),
            ),
            AppError::Pipeline(error) => {
                let (status, code) = classify(error);
                if status.is_server_error() {
                    tracing::error!(error = %error, "request failed");
                }
                (status, json!({ "error": error.to_string(), "code": code }))
            }
            AppError::Failure(failure) => {
                let (status, code) = classify(&failure.error);
                let mut body = json!({
                    "error": failure.error.to_string(),
                    "code": code,
                    "stage": failure.stage,
                    "request_id": failure.request_id,
                });
                if let Some(job_id) = &failure.job_id {
                    body["job_id"] = json!(job_id);
                }
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}
