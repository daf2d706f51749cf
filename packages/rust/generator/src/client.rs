//! HTTP client for the external text-generation service.
//!
//! One call to [`TextGenerator::generate`] is one logical request: the
//! client retries retryable failures internally according to its
//! [`RetryPolicy`] and returns the last classified error once the budget is
//! spent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};
use url::Url;

use studyqa_shared::{AppConfig, Result, StudyQaError, api_key};

use crate::error::GenerationError;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("StudyQA/", env!("CARGO_PKG_VERSION"));

/// Max chars of an error body kept in [`GenerationError::Rejected`].
const ERROR_BODY_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// TextGenerator
// ---------------------------------------------------------------------------

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

/// Runtime client configuration, resolved from [`AppConfig`] at startup.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: Url,
    /// `None` makes every request fail fast with `ConfigurationMissing`.
    pub api_key: Option<String>,
    pub api_key_header: HeaderName,
    /// JSON pointer to the generated text in a success response.
    pub response_pointer: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GeneratorConfig {
    /// Resolve the client config, reading the credential from the environment.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let generation = &config.generation;

        let endpoint = Url::parse(&generation.endpoint).map_err(|e| {
            StudyQaError::config(format!(
                "generation.endpoint '{}' is not a valid URL: {e}",
                generation.endpoint
            ))
        })?;

        let api_key_header = HeaderName::from_bytes(generation.api_key_header.as_bytes())
            .map_err(|e| {
                StudyQaError::config(format!(
                    "generation.api_key_header '{}' is not a valid header name: {e}",
                    generation.api_key_header
                ))
            })?;

        let api_key = api_key(config);
        if let Some(key) = &api_key {
            HeaderValue::from_str(key).map_err(|_| {
                StudyQaError::config(format!(
                    "the value of {} contains characters not allowed in an HTTP header",
                    generation.api_key_env
                ))
            })?;
        }

        if !generation.response_pointer.is_empty() && !generation.response_pointer.starts_with('/')
        {
            return Err(StudyQaError::config(format!(
                "generation.response_pointer '{}' must start with '/'",
                generation.response_pointer
            )));
        }

        Ok(Self {
            endpoint,
            api_key,
            api_key_header,
            response_pointer: generation.response_pointer.clone(),
            timeout: Duration::from_secs(generation.timeout_secs),
            retry: RetryPolicy::from(&generation.retry),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpGenerator
// ---------------------------------------------------------------------------

/// [`TextGenerator`] backed by a JSON-over-HTTPS generate-content endpoint.
pub struct HttpGenerator {
    client: Client,
    config: GeneratorConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpGenerator {
    /// Create a client with the given configuration.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StudyQaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff clock.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Whether a credential is configured.
    pub fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// One HTTP round trip. Returns the response status when one was received.
    async fn send_once(
        &self,
        api_key: &str,
        prompt: &str,
    ) -> (Option<StatusCode>, std::result::Result<String, GenerationError>) {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = match self
            .client
            .post(self.config.endpoint.clone())
            .header(self.config.api_key_header.clone(), api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return (None, Err(classify_transport(&e))),
        };

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return (Some(status), Err(classify_status(status, &headers, &text)));
        }

        let result = match response.json::<Value>().await {
            Ok(envelope) => extract_text(&envelope, &self.config.response_pointer),
            Err(e) if e.is_decode() => Err(GenerationError::MalformedEnvelope {
                pointer: self.config.response_pointer.clone(),
            }),
            Err(e) => Err(classify_transport(&e)),
        };
        (Some(status), result)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!(
                error_kind = GenerationError::ConfigurationMissing.kind(),
                "no API credential configured, skipping generation request"
            );
            return Err(GenerationError::ConfigurationMissing);
        };

        let mut attempt: u32 = 1;
        loop {
            let started = Instant::now();
            let (status, result) = self.send_once(api_key, prompt).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let status_code = status.map(|s| s.as_u16());

            let err = match result {
                Ok(text) => {
                    info!(
                        attempt,
                        status = status_code,
                        latency_ms,
                        text_len = text.len(),
                        "generation request succeeded"
                    );
                    return Ok(text);
                }
                Err(err) => err,
            };

            let backoff = self.config.retry.backoff(attempt, &err);
            warn!(
                attempt,
                max_attempts = self.config.retry.max_attempts,
                status = status_code,
                latency_ms,
                error_kind = err.kind(),
                retry_in_ms = backoff.map(|d| d.as_millis() as u64),
                error = %err,
                "generation request failed"
            );

            match backoff {
                Some(delay) => {
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn classify_transport(e: &reqwest::Error) -> GenerationError {
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    GenerationError::Transient { message }
}

fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED => GenerationError::Unauthorized,
        StatusCode::FORBIDDEN => GenerationError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT => GenerationError::Transient {
            message: format!("HTTP {}", status.as_u16()),
        },
        s if s.is_server_error() => GenerationError::Transient {
            message: format!("HTTP {}", s.as_u16()),
        },
        s => GenerationError::Rejected {
            status: s.as_u16(),
            message: body.chars().take(ERROR_BODY_CHARS).collect(),
        },
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn extract_text(envelope: &Value, pointer: &str) -> std::result::Result<String, GenerationError> {
    envelope
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::MalformedEnvelope {
            pointer: pointer.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
