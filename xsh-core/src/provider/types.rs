//! Common types for LLM providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model '{0}' is not available")]
    ModelUnavailable(String),

    #[error("no API key configured for {0}")]
    MissingApiKey(ProviderKind),

    #[error("no AI model configured. Please set one of: ANTHROPIC_API_KEY, GOOGLE_API_KEY, OPENAI_API_KEY or OLLAMA_MODEL")]
    NotConfigured,

    #[error("model {0} is not available or not configured")]
    UnknownModel(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// Coarse classification of a [`ProviderError`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure: connection refused, timeout, TLS
    Network,
    /// The requested model does not exist or is not served
    ModelUnavailable,
    /// Any other non-success answer from the API
    Api,
    /// Missing keys or unknown model slots
    Configuration,
    /// The response could not be decoded
    Malformed,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Request(err) if err.is_decode() => ErrorKind::Malformed,
            ProviderError::Request(_) => ErrorKind::Network,
            ProviderError::Json(_) => ErrorKind::Malformed,
            ProviderError::Api { .. } => ErrorKind::Api,
            ProviderError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            ProviderError::MissingApiKey(_)
            | ProviderError::NotConfigured
            | ProviderError::UnknownModel(_) => ErrorKind::Configuration,
            ProviderError::Other(_) => ErrorKind::Api,
        }
    }

    /// Builds an error from a non-success HTTP answer.
    ///
    /// Vendors report a missing model as a 404 or through a structured error
    /// code (`model_not_found`, `not_found_error`, `NOT_FOUND`); both map to
    /// [`ProviderError::ModelUnavailable`].
    pub fn from_status(status: u16, body: &str, model: &str) -> Self {
        let detail = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error);

        let coded_missing = detail.as_ref().is_some_and(ErrorDetail::is_missing_model);
        if status == 404 || coded_missing {
            return ProviderError::ModelUnavailable(model.to_string());
        }

        let message = detail
            .and_then(|detail| detail.message)
            .unwrap_or_else(|| body.trim().to_string());
        ProviderError::Api { status, message }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Error body shape shared (loosely) by the supported vendors.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorDetail {
    fn is_missing_model(&self) -> bool {
        let code = self.code.as_ref().and_then(|code| code.as_str());
        code == Some("model_not_found")
            || self.error_type.as_deref() == Some("not_found_error")
            || self.status.as_deref() == Some("NOT_FOUND")
    }
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    Err(ProviderError::from_status(status.as_u16(), &body, model))
}

/// The vendors xsh can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Google,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl ProviderKind {
    /// Order used to pick a default slot when several are configured.
    pub const PRIORITY: [ProviderKind; 4] = [
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::OpenAi,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Google => "https://generativelanguage.googleapis.com",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-3-sonnet-20240229",
            ProviderKind::Google => "gemini-pro",
            ProviderKind::OpenAi => "gpt-3.5-turbo",
            ProviderKind::Ollama => "qwen2.5-coder:1.5b",
        }
    }

    pub fn default_fallback(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("gpt-3.5-turbo"),
            _ => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider trait for LLM backends.
///
/// Implementations turn a [`CompletionRequest`] into the vendor's wire format
/// and return the generated text.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run a single (non-conversational) completion and return its text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// List the model ids this backend can serve.
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// Request for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.2,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Concatenated system messages, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        (!system.is_empty()).then(|| system.join("\n\n"))
    }

    /// Messages other than the system prompt.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != "system")
    }
}

/// A single message in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
