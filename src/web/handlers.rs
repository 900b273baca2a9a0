use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult, PipelineError},
    image_processing,
    models::{CategorySelection, ClothingCategory, ClothingItem, GenerationItem, GenerationRequest},
    selection::validate_selections,
    storage::{Bucket, bare_mime_type},
    web::AppState,
};

const DEFAULT_AUTHOR: &str = "anonymous";

#[derive(Default)]
struct GenerateForm {
    face_image: Option<(Vec<u8>, Option<String>)>,
    selections: Option<String>,
    author_id: Option<String>,
}

async fn read_generate_form(mut multipart: Multipart) -> AppResult<GenerateForm> {
    let mut form = GenerateForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("failed to read form: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "face_image" | "file" => {
                let content_type = field.content_type().map(bare_mime_type);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("failed to read face image: {err}")))?;
                form.face_image = Some((bytes.to_vec(), content_type));
            }
            "selections" | "clothing" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("failed to read selections: {err}")))?;
                form.selections = Some(text);
            }
            "author_id" | "userId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("failed to read author id: {err}")))?;
                form.author_id = Some(text.trim().to_string()).filter(|value| !value.is_empty());
            }
            _ => {}
        }
    }
    Ok(form)
}

pub async fn hello() -> &'static str {
    tracing::debug!("hello world ping");
    "Server says: Hello World!"
}

pub async fn generate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = read_generate_form(multipart).await?;

    let (face_bytes, face_type) = form
        .face_image
        .ok_or_else(|| PipelineError::Validation("face image is required".into()))?;
    if face_bytes.is_empty() {
        return Err(PipelineError::Validation("face image is empty".into()).into());
    }
    if let Some(content_type) = face_type.as_deref() {
        if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
            return Err(PipelineError::Validation(format!(
                "face image has unsupported type {content_type}"
            ))
            .into());
        }
    }
    let face_mime = image_processing::inspect_upload(&face_bytes)
        .map_err(|err| PipelineError::Validation(format!("face image is not readable: {err}")))?;

    let raw_selections = form
        .selections
        .ok_or_else(|| PipelineError::Validation("selections are required".into()))?;
    let selections: Vec<CategorySelection> = serde_json::from_str(&raw_selections)
        .map_err(|err| PipelineError::Validation(format!("selections are not valid JSON: {err}")))?;
    validate_selections(&selections)?;

    let pipeline = state.pipeline()?;
    let face = state
        .artifacts
        .persist_bytes(Bucket::Faces, &face_bytes, Some(face_mime))
        .await?;
    let request = GenerationRequest::new(
        face.key,
        face.url,
        form.author_id.unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        selections,
    );
    tracing::info!(request_id = %request.request_id, "generation request accepted");

    // The run lives on its own task so a dropped connection cannot abort it midway.
    let item = tokio::spawn(async move { pipeline.run(request).await })
        .await
        .map_err(|err| PipelineError::persistence(format!("generation task failed: {err}")))??;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn categories(State(state): State<AppState>) -> AppResult<Json<Vec<ClothingCategory>>> {
    Ok(Json(state.catalog.list_categories().await?))
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    #[serde(rename = "categoryId", alias = "category_id")]
    pub category_id: Option<String>,
}

pub async fn category(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> AppResult<Json<Vec<ClothingItem>>> {
    let category_id = query
        .category_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| PipelineError::Validation("categoryId is required".into()))?;
    let category = state
        .catalog
        .find_category(&category_id)
        .await?
        .ok_or_else(|| PipelineError::not_found("category", &category_id))?;
    Ok(Json(state.catalog.list_items(&category).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "authorId", alias = "author_id", alias = "userId")]
    pub author_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<GenerationItem>>> {
    let author_id = query.author_id.filter(|id| !id.trim().is_empty());
    let records = state.records.list(author_id.as_deref(), query.limit).await?;
    Ok(Json(records))
}

pub async fn gallery(State(state): State<AppState>) -> AppResult<Json<Vec<GenerationItem>>> {
    Ok(Json(state.records.list(None, None).await?))
}
