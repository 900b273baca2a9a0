//! Text-to-image client for the OpenAI images API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::PipelineError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";
const PROVIDER: &str = "image generator";

/// Generates exactly one square image for a prompt and returns its temporary URL.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Option<Vec<ImageData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

async fn assert_ok_response(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(PipelineError::upstream(
        PROVIDER,
        format!("request failed: {status} {text}"),
    ))
}

fn extract_image_url(payload: ImagesResponse) -> Result<String, PipelineError> {
    if let Some(message) = payload.error.and_then(|err| err.message) {
        return Err(PipelineError::upstream(PROVIDER, message));
    }
    payload
        .data
        .and_then(|images| images.into_iter().next())
        .and_then(|image| image.url)
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| PipelineError::upstream(PROVIDER, "response did not include an image url"))
}

#[derive(Clone, Debug)]
pub struct OpenAiImageClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiImageClient {
    pub fn new(client: Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    pub fn with_timeout(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url, api_key, model))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "requesting target image");
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": IMAGE_SIZE,
            }))
            .send()
            .await
            .map_err(|err| PipelineError::upstream(PROVIDER, err.to_string()))?;

        let response = assert_ok_response(response).await?;
        let text = response
            .text()
            .await
            .map_err(|err| PipelineError::upstream(PROVIDER, err.to_string()))?;
        let payload: ImagesResponse = serde_json::from_str(&text).map_err(|err| {
            PipelineError::upstream(PROVIDER, format!("malformed response: {err}"))
        })?;
        extract_image_url(payload)
    }
}
