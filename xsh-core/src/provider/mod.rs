//! LLM provider abstraction layer.
//!
//! This module defines a common interface for the supported LLM backends
//! (Anthropic, Google, OpenAI, Ollama) to produce single-shot completions
//! and list the models they serve.

mod types;
pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

use crate::config::ModelConfig;
use std::sync::Arc;

// Re-export common types
pub use types::{
    CompletionRequest,
    ErrorKind,
    Message,
    Provider,
    ProviderError,
    ProviderKind,
    Result,
};

// Re-export provider implementations
pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Builds the provider client for a model slot.
pub fn build(config: &ModelConfig, http_client: reqwest::Client) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config, http_client)?),
        ProviderKind::Google => Arc::new(GoogleProvider::new(config, http_client)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config, http_client)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config, http_client)),
    };
    Ok(provider)
}
