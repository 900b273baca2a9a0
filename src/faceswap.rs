//! Client for the two-phase face-swap provider: submit a job, then poll it.
//!
//! The provider reports jobs as missing or broken when polled right after
//! submission, so the first status request is only sent once a fixed settling
//! delay has passed since the job was created. That delay is a grace period,
//! not a retry interval. After it, the client polls up to
//! [`PollPolicy::attempts`] times with doubling backoff, bounded by
//! [`PollPolicy::max_wait`]. Pending jobs, transport errors, 404, 429 and 5xx
//! replies are retried; the job fails only once the attempts or the wait budget
//! run out. With `attempts == 1` this is the single-shot poll.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tokio::time::{Instant, sleep, sleep_until};

use crate::{
    error::PipelineError,
    image_processing,
    models::{FaceSwapJob, FaceSwapStatus},
};

const PROVIDER: &str = "face swap";
const DEFAULT_SETTLE_SECS: u64 = 10;
const DEFAULT_POLL_BACKOFF_MS: u64 = 2_000;
const DEFAULT_MAX_WAIT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub settle_delay: Duration,
    pub attempts: u32,
    pub backoff: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_SECS),
            attempts: 1,
            backoff: Duration::from_millis(DEFAULT_POLL_BACKOFF_MS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

#[async_trait]
pub trait FaceSwapper: Send + Sync {
    /// Uploads both images and returns the provider's job handle.
    async fn submit(&self, target_image: &[u8], face_image: &[u8])
    -> Result<FaceSwapJob, PipelineError>;

    /// Waits out the settling delay, then polls until the result URL is known.
    async fn await_result(&self, job: &mut FaceSwapJob) -> Result<String, PipelineError>;
}

/// Outcome of a single status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(String),
    Pending(String),
    /// The provider could not answer this time: transport error, 404, 429 or 5xx.
    Unavailable(String),
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::NOT_FOUND
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "id", alias = "jobId")]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    #[serde(alias = "result_url", alias = "image_url", alias = "output_url")]
    result_image_url: Option<String>,
    error: Option<String>,
}

fn interpret_status(job_id: &str, payload: StatusResponse) -> Result<PollOutcome, PipelineError> {
    let status = payload
        .status
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let result_url = payload.result_image_url.filter(|url| !url.trim().is_empty());
    match status.as_str() {
        "failed" | "error" | "cancelled" => Err(PipelineError::upstream(
            PROVIDER,
            format!(
                "job {job_id} failed: {}",
                payload.error.unwrap_or_else(|| "no reason given".into())
            ),
        )),
        "completed" | "succeeded" | "success" | "done" | "" => {
            result_url.map(PollOutcome::Completed).ok_or_else(|| {
                PipelineError::upstream(PROVIDER, format!("job {job_id} has no result url"))
            })
        }
        other => Ok(PollOutcome::Pending(other.to_string())),
    }
}

fn image_part(bytes: &[u8], name: &str) -> Result<Part, PipelineError> {
    let mime_type = image_processing::detect_mime_type(bytes).unwrap_or("application/octet-stream");
    let ext = crate::storage::get_extension_from_mime_type(mime_type);
    Part::bytes(bytes.to_vec())
        .file_name(format!("{name}.{ext}"))
        .mime_str(mime_type)
        .map_err(|err| PipelineError::upstream(PROVIDER, err.to_string()))
}

#[derive(Clone, Debug)]
pub struct FaceSwapClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    policy: PollPolicy,
}

impl FaceSwapClient {
    pub fn new(client: Client, base_url: String, api_key: Option<String>, policy: PollPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            policy,
        }
    }

    pub fn with_timeout(
        base_url: String,
        api_key: Option<String>,
        policy: PollPolicy,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url, api_key, policy))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Sends one status request. Refuses to poll before the settling delay has elapsed.
    pub async fn poll(&self, job: &mut FaceSwapJob) -> Result<PollOutcome, PipelineError> {
        let elapsed = job.submitted_at.elapsed();
        if elapsed < self.policy.settle_delay {
            return Err(PipelineError::upstream(
                PROVIDER,
                format!(
                    "job {} polled {}ms after submission, before the {}ms settling delay",
                    job.job_id,
                    elapsed.as_millis(),
                    self.policy.settle_delay.as_millis()
                ),
            ));
        }
        job.status = FaceSwapStatus::Polling;

        let request = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job.job_id));
        let response = match self.authorize(request).send().await {
            Ok(response) => response,
            Err(err) => return Ok(PollOutcome::Unavailable(format!("transport error: {err}"))),
        };
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("status request for job {} failed: {status} {text}", job.job_id);
            if is_transient_status(status) {
                return Ok(PollOutcome::Unavailable(message));
            }
            job.status = FaceSwapStatus::Failed;
            return Err(PipelineError::upstream(PROVIDER, message));
        }
        let payload: StatusResponse = response.json().await.map_err(|err| {
            PipelineError::upstream(PROVIDER, format!("malformed status response: {err}"))
        })?;

        let outcome = interpret_status(&job.job_id, payload);
        match &outcome {
            Ok(PollOutcome::Completed(url)) => {
                job.status = FaceSwapStatus::Completed;
                job.result_image_url = Some(url.clone());
            }
            Ok(PollOutcome::Pending(_) | PollOutcome::Unavailable(_)) => {}
            Err(_) => job.status = FaceSwapStatus::Failed,
        }
        outcome
    }
}

#[async_trait]
impl FaceSwapper for FaceSwapClient {
    async fn submit(
        &self,
        target_image: &[u8],
        face_image: &[u8],
    ) -> Result<FaceSwapJob, PipelineError> {
        let form = Form::new()
            .part("target_image", image_part(target_image, "target")?)
            .part("swap_image", image_part(face_image, "face")?);
        let request = self.client.post(format!("{}/jobs", self.base_url)).multipart(form);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| PipelineError::upstream(PROVIDER, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::upstream(
                PROVIDER,
                format!("job submission rejected: {status} {text}"),
            ));
        }
        let payload: SubmitResponse = response.json().await.map_err(|err| {
            PipelineError::upstream(PROVIDER, format!("malformed submit response: {err}"))
        })?;
        let job_id = payload
            .job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PipelineError::upstream(PROVIDER, "submit response did not include a job id"))?;
        tracing::info!(job_id = %job_id, "face swap job submitted");
        Ok(FaceSwapJob::submitted(job_id))
    }

    async fn await_result(&self, job: &mut FaceSwapJob) -> Result<String, PipelineError> {
        let settled_at = job.submitted_at + self.policy.settle_delay;
        sleep_until(settled_at).await;

        let attempts = self.policy.attempts.max(1);
        let deadline = settled_at + self.policy.max_wait;
        let mut backoff = self.policy.backoff;
        let mut last_status = String::from("unknown");
        for attempt in 1..=attempts {
            match self.poll(job).await? {
                PollOutcome::Completed(url) => {
                    tracing::info!(job_id = %job.job_id, attempt, "face swap job completed");
                    return Ok(url);
                }
                PollOutcome::Pending(status) => {
                    tracing::debug!(job_id = %job.job_id, attempt, status = %status, "face swap job pending");
                    last_status = status;
                }
                PollOutcome::Unavailable(reason) => {
                    tracing::warn!(job_id = %job.job_id, attempt, reason = %reason, "face swap status unavailable");
                    last_status = reason;
                }
            }
            if attempt == attempts || Instant::now() + backoff > deadline {
                break;
            }
            sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }

        job.status = FaceSwapStatus::Failed;
        Err(PipelineError::upstream(
            PROVIDER,
            format!("job {} not complete (last status: {last_status})", job.job_id),
        ))
    }
}
