use std::{env, path::PathBuf, time::Duration};

use crate::{faceswap::PollPolicy, openai, storage::local::normalize_base_url};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const PUBLIC_ROUTE: &str = "/public";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct FaceSwapConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub poll: PollPolicy,
}

/// Server configuration read from the environment.
///
/// | Env Var                    | Default                          |
/// |----------------------------|----------------------------------|
/// | `PORT`                     | `3000`                           |
/// | `DATA_DIR`                 | `<cache dir>/tryon-server`       |
/// | `PUBLIC_URL` / `DOMAIN`    | `http://<bind address>`          |
/// | `OPENAI_API_KEY`           | required for generation          |
/// | `OPENAI_BASE_URL`          | `https://api.openai.com/v1`      |
/// | `OPENAI_IMAGE_MODEL`       | `dall-e-3`                       |
/// | `FACESWAP_API_URL`         | required for generation          |
/// | `FACESWAP_API_KEY`         | unset                            |
/// | `FACESWAP_SETTLE_SECS`     | `10`                             |
/// | `FACESWAP_POLL_ATTEMPTS`   | `1`                              |
/// | `FACESWAP_POLL_BACKOFF_MS` | `2000`                           |
/// | `FACESWAP_MAX_WAIT_SECS`   | `120`                            |
/// | `UPSTREAM_TIMEOUT_SECS`    | `60`                             |
/// | `MAX_UPLOAD_BYTES`         | `20971520`                       |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub data_dir: PathBuf,
    /// Base URL of the `/public` route, without trailing slash.
    pub public_base_url: String,
    pub openai: Option<OpenAiConfig>,
    pub faceswap: Option<FaceSwapConfig>,
    pub upstream_timeout: Duration,
    pub max_upload_bytes: usize,
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|value| value.parse().ok())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = parsed_var::<u16>("PORT").unwrap_or(DEFAULT_PORT);
        let bind_address = format!("0.0.0.0:{port}");

        let openai = non_empty_var("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            base_url: non_empty_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
            model: non_empty_var("OPENAI_IMAGE_MODEL")
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
        });

        let defaults = PollPolicy::default();
        let faceswap = non_empty_var("FACESWAP_API_URL").map(|api_url| FaceSwapConfig {
            api_url,
            api_key: non_empty_var("FACESWAP_API_KEY"),
            poll: PollPolicy {
                settle_delay: parsed_var("FACESWAP_SETTLE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.settle_delay),
                attempts: parsed_var::<u32>("FACESWAP_POLL_ATTEMPTS")
                    .unwrap_or(defaults.attempts)
                    .max(1),
                backoff: parsed_var("FACESWAP_POLL_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.backoff),
                max_wait: parsed_var("FACESWAP_MAX_WAIT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.max_wait),
            },
        });

        Self {
            data_dir: resolve_data_dir(),
            public_base_url: resolve_public_base_url(&bind_address),
            bind_address,
            openai,
            faceswap,
            upstream_timeout: Duration::from_secs(
                parsed_var("UPSTREAM_TIMEOUT_SECS").unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    /// Names of the variables that must be set before `POST /generate` can work.
    pub fn missing_provider_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.faceswap.is_none() {
            missing.push("FACESWAP_API_URL");
        }
        missing
    }
}

fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_var("DATA_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("tryon-server");
    base
}

fn resolve_public_base_url(bind_address: &str) -> String {
    if let Some(public_url) = non_empty_var("PUBLIC_URL") {
        return format!("{}{PUBLIC_ROUTE}", normalize_base_url(&public_url));
    }
    let raw_domain = non_empty_var("DOMAIN").unwrap_or_else(|| bind_address.to_string());
    public_base_from_domain(&raw_domain)
}

fn public_base_from_domain(raw_domain: &str) -> String {
    let trimmed = raw_domain.trim();
    let base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    format!("{}{PUBLIC_ROUTE}", normalize_base_url(&base))
}
