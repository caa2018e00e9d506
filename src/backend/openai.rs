//! Hosted OpenAI-compatible chat completions adapter (Groq, OpenAI, and look-alikes).

use super::prompt::SYSTEM_PROMPT;
use super::{BackendError, SummaryBackend, classify_send_error, ensure_success, non_empty};
use crate::config::{BackendConfig, BackendProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Summarization backend for hosted chat-completions APIs.
pub struct OpenAiBackend {
    http: Client,
    provider: BackendProvider,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    /// Build an adapter from a shared HTTP client and a validated backend configuration.
    pub fn new(http: Client, config: &BackendConfig) -> Self {
        Self {
            http,
            provider: config.provider,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn label(&self) -> &'static str {
        match self.provider {
            BackendProvider::Groq => "Groq API",
            _ => "OpenAI-compatible API",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SummaryBackend for OpenAiBackend {
    fn provider(&self) -> BackendProvider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_send_error(error, &endpoint))?;
        let response = ensure_success(response, self.label()).await?;

        let completion: ChatCompletion = response.json().await.map_err(|error| {
            let error = error.without_url();
            BackendError::Response(format!(
                "failed to decode {} response: {error}",
                self.label()
            ))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                BackendError::Response(format!("{} returned no choices", self.label()))
            })?;

        non_empty(&content, self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn backend(base_url: String) -> OpenAiBackend {
        let mut config = BackendConfig::for_provider(BackendProvider::Groq);
        config.base_url = base_url;
        config.api_key = Some("gsk-test".into());
        OpenAiBackend::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn sends_bearer_credential_and_reads_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("Authorization", "Bearer gsk-test")
                    .json_body_partial(r#"{"model":"llama-3.1-8b-instant","max_tokens":2000}"#)
                    .body_contains(SYSTEM_PROMPT);
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": " Headline. " } }
                    ]
                }));
            })
            .await;

        let summary = backend(server.base_url())
            .summarize_one("Entropy always increases.", None)
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "Headline.");
    }

    #[tokio::test]
    async fn too_many_requests_is_structured_rate_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429)
                    .body(r#"{"error":{"message":"tokens per minute exceeded"}}"#);
            })
            .await;

        let error = backend(server.base_url())
            .generate("Summarize")
            .await
            .expect_err("rate limited");

        assert!(matches!(
            error,
            BackendError::RateLimited {
                status: Some(429),
                ..
            }
        ));
        assert!(error.is_rate_limited());
    }

    #[tokio::test]
    async fn empty_choices_are_a_response_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = backend(server.base_url())
            .generate("Summarize")
            .await
            .expect_err("no choices");
        assert!(matches!(error, BackendError::Response(ref message) if message.contains("no choices")));
    }

    #[tokio::test]
    async fn malformed_body_is_a_response_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let error = backend(server.base_url())
            .generate("Summarize")
            .await
            .expect_err("malformed");
        assert!(matches!(error, BackendError::Response(_)));
    }
}
