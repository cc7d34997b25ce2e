//! xsh-core - Configuration and AI provider layer for xsh
//!
//! Provides the pieces the shell wrapper consumes through a narrow contract:
//! - LLM provider clients (Anthropic, Google, OpenAI, Ollama)
//! - Model catalogue and switching
//! - Configuration management (YAML file + environment overlay)
//!
//! ## Primary API
//!
//! The wrapper talks to the AI layer only through the [`Assistant`] trait,
//! implemented by [`AiClient`].

pub mod client;
pub mod config;
pub mod models;
pub mod provider;

pub use client::{AiClient, Assistant, RetryPolicy};
pub use config::{Config, ConfigError, LlmConfig, LogConfig, ModelConfig, ShellConfig};
pub use models::ModelInfo;
pub use provider::{ErrorKind, Provider, ProviderError, ProviderKind};
