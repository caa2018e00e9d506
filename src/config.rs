use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// The selected backend needs a credential that was not supplied.
    #[error("{provider} requires an API key; set LLM_API_KEY or {fallback}")]
    MissingCredential {
        /// Provider that was selected.
        provider: BackendProvider,
        /// Provider-specific variable that is also accepted.
        fallback: &'static str,
    },
    /// The HTTP client for the backend could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
    /// The global configuration cache was already populated.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Topical service and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend selection and per-backend tuning.
    pub backend: BackendConfig,
    /// Pipeline-wide knobs that are independent of the backend.
    pub pipeline: PipelineConfig,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported language-model backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendProvider {
    /// Local Ollama daemon.
    Ollama,
    /// Groq's hosted OpenAI-compatible API.
    Groq,
    /// Any other hosted OpenAI-compatible API.
    OpenAI,
}

impl BackendProvider {
    /// Whether the provider is a hosted API that needs a bearer credential.
    pub const fn is_hosted(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Lowercase identifier used in configuration and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Groq => "groq",
            Self::OpenAI => "openai",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "mistral",
            Self::Groq => "llama-3.1-8b-instant",
            Self::OpenAI => "gpt-4o-mini",
        }
    }

    fn default_chunk_size(self) -> usize {
        if self.is_hosted() { 8000 } else { 3000 }
    }

    fn default_request_timeout(self) -> Duration {
        if self.is_hosted() {
            Duration::from_secs(120)
        } else {
            Duration::from_secs(300)
        }
    }

    fn default_tokens_per_minute(self) -> Option<u32> {
        // Groq free tier.
        matches!(self, Self::Groq).then_some(6000)
    }

    fn credential_variable(self) -> &'static str {
        match self {
            Self::Ollama => "OLLAMA_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Aggregate throughput budget for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThroughputLimits {
    /// Token-bucket budget in tokens per minute.
    pub tokens_per_minute: Option<u32>,
    /// Fixed minimum spacing between the start of consecutive calls.
    pub min_call_interval: Option<Duration>,
}

impl ThroughputLimits {
    /// True when neither limit is configured.
    pub fn is_unlimited(&self) -> bool {
        self.tokens_per_minute.is_none() && self.min_call_interval.is_none()
    }
}

/// Identifies which backend to call and how to talk to it.
///
/// Built once per service lifetime and shared read-only with every pipeline run.
#[derive(Clone)]
pub struct BackendConfig {
    /// Backend flavour.
    pub provider: BackendProvider,
    /// Base URL of the serving endpoint.
    pub base_url: String,
    /// Model identifier passed to the backend.
    pub model: String,
    /// Bearer credential for hosted APIs.
    pub api_key: Option<String>,
    /// Default chunk size in characters for documents sent to this backend.
    pub chunk_size: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Upper bound on generated tokens per call.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Proactive throttling applied before each call.
    pub throughput: ThroughputLimits,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("chunk_size", &self.chunk_size)
            .field("request_timeout", &self.request_timeout)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("throughput", &self.throughput)
            .finish()
    }
}

impl BackendConfig {
    /// Defaults for a provider, before any environment overrides.
    pub fn for_provider(provider: BackendProvider) -> Self {
        let base_url = match provider {
            BackendProvider::Ollama => DEFAULT_OLLAMA_URL,
            BackendProvider::Groq => DEFAULT_GROQ_URL,
            BackendProvider::OpenAI => DEFAULT_OPENAI_URL,
        };
        Self {
            provider,
            base_url: base_url.to_string(),
            model: provider.default_model().to_string(),
            api_key: None,
            chunk_size: provider.default_chunk_size(),
            request_timeout: provider.default_request_timeout(),
            max_output_tokens: 2000,
            temperature: 0.7,
            throughput: ThroughputLimits {
                tokens_per_minute: provider.default_tokens_per_minute(),
                min_call_interval: None,
            },
        }
    }

    /// Load backend settings from the environment and validate them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match load_env_optional("LLM_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".to_string()))?,
            None => BackendProvider::Ollama,
        };
        let mut config = Self::for_provider(provider);

        let base_url = load_env_optional("LLM_BASE_URL").or_else(|| match provider {
            BackendProvider::Ollama => load_env_optional("OLLAMA_BASE_URL"),
            _ => None,
        });
        if let Some(base_url) = base_url {
            config.base_url = base_url;
        }
        if let Some(model) = load_env_optional("LLM_MODEL") {
            config.model = model;
        }
        config.api_key = load_env_optional("LLM_API_KEY")
            .or_else(|| load_env_optional(provider.credential_variable()));
        if let Some(chunk_size) = parse_env::<usize>("LLM_CHUNK_SIZE")? {
            config.chunk_size = chunk_size;
        }
        if let Some(secs) = parse_env::<u64>("LLM_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(tokens) = parse_env::<u32>("LLM_MAX_OUTPUT_TOKENS")? {
            config.max_output_tokens = tokens;
        }
        if let Some(temperature) = parse_env::<f32>("LLM_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(tpm) = parse_env::<u32>("LLM_TOKENS_PER_MINUTE")? {
            // Zero disables the bucket.
            config.throughput.tokens_per_minute = (tpm > 0).then_some(tpm);
        }
        if let Some(secs) = parse_env::<f64>("LLM_MIN_CALL_INTERVAL_SECS")? {
            config.throughput.min_call_interval = (secs > 0.0)
                .then(|| Duration::try_from_secs_f64(secs))
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("LLM_MIN_CALL_INTERVAL_SECS".into()))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.is_hosted()
            && self
                .api_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential {
                provider: self.provider,
                fallback: self.provider.credential_variable(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("LLM_CHUNK_SIZE".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue("LLM_BASE_URL".into()));
        }
        Ok(())
    }
}

/// Pipeline knobs that apply regardless of backend.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Attempts per backend call, including the first.
    pub max_attempts: u32,
    /// Base delay of the linear rate-limit backoff.
    pub retry_base_delay: Duration,
    /// Number of chunk calls allowed in flight at once.
    pub max_concurrent_chunks: usize,
    /// Deadline for a whole pipeline run.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_overlap: 200,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            max_concurrent_chunks: 1,
            timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Load pipeline settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(overlap) = parse_env::<usize>("LLM_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }
        if let Some(attempts) = parse_env::<u32>("LLM_MAX_RETRIES")? {
            config.max_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_env::<u64>("LLM_RETRY_BASE_DELAY_MS")? {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(concurrency) = parse_env::<usize>("SUMMARY_MAX_CONCURRENT_CHUNKS")? {
            config.max_concurrent_chunks = concurrency.max(1);
        }
        config.timeout = parse_env::<u64>("SUMMARY_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(config)
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: BackendConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            server_port: parse_env("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = %config.backend.provider,
        base_url = %config.backend.base_url,
        model = %config.backend.model,
        chunk_size = config.backend.chunk_size,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_provider_without_key_fails_validation() {
        let config = BackendConfig::for_provider(BackendProvider::Groq);
        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            ConfigError::MissingCredential {
                provider: BackendProvider::Groq,
                fallback: "GROQ_API_KEY"
            }
        ));
    }

    #[test]
    fn local_provider_needs_no_key() {
        let config = BackendConfig::for_provider(BackendProvider::Ollama);
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 3000);
        assert!(config.throughput.is_unlimited());
    }

    #[test]
    fn groq_defaults_carry_throughput_budget() {
        let mut config = BackendConfig::for_provider(BackendProvider::Groq);
        config.api_key = Some("gsk-test".into());
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 8000);
        assert_eq!(config.throughput.tokens_per_minute, Some(6000));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Groq".parse::<BackendProvider>(), Ok(BackendProvider::Groq));
        assert_eq!(
            " ollama ".parse::<BackendProvider>(),
            Ok(BackendProvider::Ollama)
        );
        assert!("gemini".parse::<BackendProvider>().is_err());
    }

    #[test]
    fn debug_output_redacts_credential() {
        let mut config = BackendConfig::for_provider(BackendProvider::OpenAI);
        config.api_key = Some("sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
