//! Local Ollama daemon adapter (`POST /api/generate`, non-streaming).

use super::{BackendError, SummaryBackend, classify_send_error, ensure_success, non_empty};
use crate::config::{BackendConfig, BackendProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Summarization backend talking to a local Ollama runtime.
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    num_predict: u32,
}

impl OllamaBackend {
    /// Build an adapter from a shared HTTP client and the backend configuration.
    pub fn new(http: Client, config: &BackendConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            num_predict: config.max_output_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    done: bool,
}

#[async_trait]
impl SummaryBackend for OllamaBackend {
    fn provider(&self) -> BackendProvider {
        BackendProvider::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.num_predict,
            }
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_send_error(error, &endpoint))?;
        let response = ensure_success(response, "Ollama").await?;

        let body: OllamaResponse = response.json().await.map_err(|error| {
            let error = error.without_url();
            BackendError::Response(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(BackendError::Response(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        non_empty(&body.response, "Ollama")
    }
}
