//! Language-model backends behind one summarization interface.
//!
//! Each backend owns its request/response translation (local Ollama daemon, hosted
//! OpenAI-compatible chat API) and maps transport failures onto [`BackendError`]. The
//! pipeline only ever sees [`SummaryBackend`]; which adapter sits behind it is decided once,
//! from [`BackendConfig`], when [`build_backend`] runs.

mod ollama;
mod openai;
pub mod prompt;

use crate::config::{BackendConfig, BackendProvider, ConfigError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use thiserror::Error;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Failures surfaced by a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The serving process could not be reached (connection refused, timeout, gateway errors).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// The backend rejected the request because of its throughput ceiling.
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// HTTP status reported by the transport, when there was one.
        status: Option<u16>,
        /// Diagnostic text returned by the backend.
        message: String,
    },
    /// The backend answered, but the body was malformed, empty, or an error payload.
    #[error("Malformed backend response: {0}")]
    Response(String),
}

impl BackendError {
    /// Whether this failure should be retried after a backoff.
    ///
    /// The structured [`BackendError::RateLimited`] variant is authoritative. A
    /// [`BackendError::Response`] falls back to matching its text for "rate limit" or "429",
    /// which catches daemons that report throttling inside an otherwise successful payload.
    /// Transport failures are never matched: their text carries the endpoint URL.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Response(message) => mentions_rate_limit(message),
            Self::Unavailable(_) => false,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("rate limit") || lowered.contains("429")
}

/// Interface implemented by every language-model backend.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    /// Provider label used in logs and results.
    fn provider(&self) -> BackendProvider;

    /// Model identifier reported back to callers.
    fn model(&self) -> &str;

    /// Send a fully assembled prompt and return the trimmed, non-empty completion.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// Summarize one piece of text using the standard headline-plus-details prompt.
    async fn summarize_one(&self, text: &str, topic: Option<&str>) -> Result<String, BackendError> {
        self.generate(&prompt::summary_prompt(text, topic)).await
    }
}

/// Build the backend selected by `config`.
///
/// Fails fast when the configuration is invalid, including a hosted provider without a
/// credential.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn SummaryBackend>, ConfigError> {
    config.validate()?;
    let http = Client::builder()
        .user_agent(concat!("topical/", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout)
        .build()
        .map_err(|error| ConfigError::HttpClient(error.to_string()))?;

    tracing::info!(
        provider = %config.provider,
        model = %config.model,
        base_url = %config.base_url,
        "Summarization backend initialized"
    );

    Ok(match config.provider {
        BackendProvider::Ollama => Arc::new(OllamaBackend::new(http, config)),
        BackendProvider::Groq | BackendProvider::OpenAI => Arc::new(OpenAiBackend::new(http, config)),
    })
}

/// Map a transport-level failure onto the backend taxonomy.
fn classify_send_error(error: reqwest::Error, endpoint: &str) -> BackendError {
    if error.is_timeout() {
        BackendError::Unavailable(format!("request to {endpoint} timed out: {error}"))
    } else if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        BackendError::RateLimited {
            status: Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            message: error.to_string(),
        }
    } else {
        BackendError::Unavailable(format!("failed to reach {endpoint}: {error}"))
    }
}

/// Turn non-success statuses into [`BackendError`] values, passing successful responses on.
async fn ensure_success(response: Response, label: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let throttled = status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(&body);
    let message = format!("{label} returned {status}: {}", body.trim());
    Err(match status {
        _ if throttled => BackendError::RateLimited {
            status: Some(status.as_u16()),
            message,
        },
        StatusCode::NOT_FOUND
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => BackendError::Unavailable(message),
        _ => BackendError::Response(message),
    })
}

/// Reject blank completions.
fn non_empty(text: &str, label: &str) -> Result<String, BackendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BackendError::Response(format!("{label} returned an empty completion")));
    }
    Ok(trimmed.to_string())
}
