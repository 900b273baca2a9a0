//! Binary image artifacts: face uploads, pre-swap targets and post-swap results.
//!
//! Every artifact is written under a fresh random id, so concurrent runs never
//! touch each other's files.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use uuid::Uuid;

use crate::{
    error::PipelineError,
    image_processing,
    storage::{LocalFileStorage, bare_mime_type, get_extension_from_mime_type},
};

const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Faces,
    Targets,
    Results,
}

impl Bucket {
    pub fn dir(self) -> &'static str {
        match self {
            Bucket::Faces => "faces",
            Bucket::Targets => "targets",
            Bucket::Results => "results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub id: Uuid,
    pub key: String,
    pub url: String,
}

/// Artifact persistence as seen by the pipeline.
#[async_trait]
pub trait Artifacts: Send + Sync {
    /// Persists bytes already held in memory.
    async fn persist_bytes(
        &self,
        bucket: Bucket,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> Result<StoredArtifact, PipelineError>;

    /// Downloads a remote image and persists it.
    async fn persist_remote(&self, bucket: Bucket, url: &str)
    -> Result<StoredArtifact, PipelineError>;

    async fn read(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
}

pub fn validate_http_url(raw: &str) -> Result<Url, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::persistence("image url is empty"));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| PipelineError::persistence(format!("invalid image url {trimmed}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(PipelineError::persistence(format!(
            "unsupported image url scheme: {scheme}"
        ))),
    }
}

/// [`Artifacts`] backed by [`LocalFileStorage`] and a shared HTTP client.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    storage: LocalFileStorage,
    client: Client,
}

impl ArtifactStore {
    pub fn new(storage: LocalFileStorage, client: Client) -> Self {
        Self { storage, client }
    }

    /// Builds a client with the given timeout applied to every download.
    pub fn with_timeout(storage: LocalFileStorage, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(storage, client))
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), PipelineError> {
        let validated = validate_http_url(url)?;
        let response = self
            .client
            .get(validated)
            .send()
            .await
            .map_err(|err| PipelineError::persistence(format!("download failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::persistence(format!(
                "download failed: HTTP {status}"
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(bare_mime_type);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| PipelineError::persistence(format!("read image bytes failed: {err}")))?;
        Ok((bytes.to_vec(), content_type))
    }
}

/// Picks the MIME type from the bytes first, then the declared type.
/// Returns `None` when neither says the payload is an image.
fn resolve_image_mime(bytes: &[u8], declared_type: Option<&str>) -> Option<String> {
    if let Some(detected) = image_processing::detect_mime_type(bytes) {
        return Some(detected.to_string());
    }
    declared_type
        .map(bare_mime_type)
        .filter(|value| value.starts_with("image/"))
}

fn artifact_key(bucket: Bucket, id: Uuid, mime_type: &str) -> String {
    let ext = match get_extension_from_mime_type(mime_type) {
        "bin" => DEFAULT_EXTENSION,
        ext => ext,
    };
    format!("{}/{id}.{ext}", bucket.dir())
}

#[async_trait]
impl Artifacts for ArtifactStore {
    async fn persist_bytes(
        &self,
        bucket: Bucket,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> Result<StoredArtifact, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::persistence("image payload is empty"));
        }
        let mime_type = resolve_image_mime(bytes, declared_type)
            .ok_or_else(|| PipelineError::persistence("payload is not an image"))?;
        let id = Uuid::new_v4();
        let key = artifact_key(bucket, id, &mime_type);
        self.storage
            .put_new(&key, bytes)
            .await
            .map_err(|err| PipelineError::persistence(format!("write {key} failed: {err}")))?;
        tracing::debug!(key = %key, size = bytes.len(), "artifact stored");
        Ok(StoredArtifact {
            id,
            url: self.storage.get_public_url(&key),
            key,
        })
    }

    async fn persist_remote(
        &self,
        bucket: Bucket,
        url: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        let (bytes, content_type) = self.download(url).await?;
        self.persist_bytes(bucket, &bytes, content_type.as_deref()).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.storage
            .get(key)
            .await
            .map_err(|err| PipelineError::persistence(format!("read {key} failed: {err}")))?
            .ok_or_else(|| PipelineError::persistence(format!("artifact {key} is missing")))
    }
}
