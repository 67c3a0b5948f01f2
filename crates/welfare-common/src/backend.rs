/// JSON-over-HTTP client for the case-management backend (resource catalog,
/// advanced suggestion endpoint).
///
/// Idempotent GETs are retried on transient failures with capped exponential
/// backoff. POSTs are sent exactly once; retrying them is the caller's call.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct BackendClientConfig {
    pub base_url: String,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl BackendClientConfig {
    /// Optional:
    /// - `RESOURCE_API_BASE_URL` (default: "http://localhost:8000")
    /// - `RESOURCE_API_TIMEOUT_SECS` (default: 30)
    /// - `RESOURCE_API_MAX_RETRIES` (default: 3)
    /// - `RESOURCE_API_RETRY_INITIAL_MS` (default: 200)
    /// - `RESOURCE_API_RETRY_MAX_MS` (default: 5000)
    /// - `RESOURCE_API_MAX_ERROR_BODY_BYTES` (default: 8192)
    pub fn from_env() -> Self {
        let base_url = std::env::var("RESOURCE_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let default_timeout = env_parse::<u64>("RESOURCE_API_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_retries = env_parse::<u32>("RESOURCE_API_MAX_RETRIES").unwrap_or(3);

        let initial_backoff = env_parse::<u64>("RESOURCE_API_RETRY_INITIAL_MS")
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(200));

        let max_backoff = env_parse::<u64>("RESOURCE_API_RETRY_MAX_MS")
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5_000));

        let max_error_body_bytes =
            env_parse::<usize>("RESOURCE_API_MAX_ERROR_BODY_BYTES").unwrap_or(8 * 1024);

        Self::new(base_url)
            .with_timeout(default_timeout)
            .with_retries(max_retries, initial_backoff, max_backoff)
            .with_max_error_body_bytes(max_error_body_bytes)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(5_000),
            max_error_body_bytes: 8 * 1024,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial: Duration, max: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_max_error_body_bytes(mut self, bytes: usize) -> Self {
        self.max_error_body_bytes = bytes;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("backend returned error: status={status} detail={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("backend returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

impl BackendError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Upstream { status, .. } | BackendError::UpstreamBody { status, .. } => {
                Some(*status)
            }
            BackendError::Request(e) => e.status(),
            BackendError::InvalidJson(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

#[derive(Clone)]
pub struct BackendClient {
    config: BackendClientConfig,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendClientConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent("welfare-mcp/resource-suggest")
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        self.request_with_retry(|| async {
            let resp = self
                .http
                .get(&url)
                .timeout(self.config.default_timeout)
                .send()
                .await?;
            Self::parse_json_response(resp, self.config.max_error_body_bytes).await
        })
        .await
    }

    /// POST a JSON body once and decode the JSON response.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout_override: Option<Duration>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let timeout = timeout_override.unwrap_or(self.config.default_timeout);
        debug!(url, "backend POST");
        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    async fn parse_json_response<T: DeserializeOwned>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, BackendError> {
        if resp.status().is_success() {
            let bytes = resp.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> BackendError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<DetailEnvelope>(&body) {
            let message = match parsed.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return BackendError::Upstream { status, message };
        }
        BackendError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "backend request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn should_retry(err: &BackendError) -> bool {
    match err {
        BackendError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        BackendError::Upstream { status, .. } | BackendError::UpstreamBody { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        BackendError::InvalidJson(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    Duration::from_millis(capped_ms.saturating_add(pseudo_jitter_ms(jitter_cap)))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    (now.subsec_nanos() as u64) % (max_inclusive + 1)
}

/// Reads at most `max_bytes` of the body, stopping the stream early.
async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    let mut body = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                let room = max_bytes - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() >= max_bytes {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read backend error body");
                if body.is_empty() {
                    return "<failed to read error body>".to_string();
                }
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    detail: serde_json::Value,
}
