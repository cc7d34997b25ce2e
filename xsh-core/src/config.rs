use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole wrapper.
///
/// Loaded from an optional YAML file, then overlaid with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shell: ShellConfig,
    pub llm: LlmConfig,
    pub system_prompt: String,
    pub log: LogConfig,
}

/// Which shell to wrap and how the AI widget is bound inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Path of the login shell to wrap
    pub path: String,
    /// Key bound to the AI widget, in zsh `bindkey` notation (e.g. `^I`)
    pub hook_key: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            path: "/bin/zsh".to_string(),
            hook_key: "^I".to_string(),
        }
    }
}

/// Configured model slots and request tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Key of the active slot in `models`
    pub current: Option<String>,
    pub models: BTreeMap<String, ModelConfig>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            current: None,
            models: BTreeMap::new(),
            max_tokens: 1000,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Returns the active slot key and its configuration.
    pub fn current_model(&self) -> Option<(&str, &ModelConfig)> {
        let key = self.current.as_deref()?;
        self.models
            .get_key_value(key)
            .map(|(key, model)| (key.as_str(), model))
    }

    /// Picks the active slot.
    ///
    /// A configured `preferred` slot wins, then an already valid selection,
    /// then the first slot in provider priority order, then any slot.
    pub fn resolve_current(&mut self, preferred: Option<&str>) {
        if let Some(preferred) = preferred.filter(|key| self.models.contains_key(*key)) {
            self.current = Some(preferred.to_string());
            return;
        }

        if self.current_model().is_some() {
            return;
        }

        let by_priority = ProviderKind::PRIORITY.iter().find_map(|kind| {
            self.models
                .iter()
                .find(|(_, model)| model.provider == *kind)
                .map(|(key, _)| key.clone())
        });

        self.current = by_priority.or_else(|| self.models.keys().next().cloned());
    }
}

/// A single model slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    /// Never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Model retried once when the configured one is unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl ModelConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: provider.default_base_url().to_string(),
            model: provider.default_model().to_string(),
            fallback_model: provider.default_fallback().map(str::to_string),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

}

/// Where diagnostics go. The terminal belongs to the wrapped shell, so logs
/// are written to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: Option<PathBuf>,
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            filter: "warn".to_string(),
        }
    }
}

impl LogConfig {
    pub fn file_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("xsh.log"))
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an AI assistant embedded in an interactive shell. The user describes what \
they want to do and you answer with shell commands they can run.

Always answer in exactly this format:
USER_MESSAGE:
<one or two sentences explaining the commands, including any important warning>
SHELL_COMMANDS:
<one complete shell command per line, without numbering, backticks or a leading $>

Suggest at most five commands, most likely first. Prefer practical, safe commands. \
If the request is unclear, ask for clarification in USER_MESSAGE and leave \
SHELL_COMMANDS empty.";

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            llm: LlmConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            log: LogConfig::default(),
        }
    }
}

/// Environment variables that register or adjust one provider slot.
struct ProviderEnv {
    slot: &'static str,
    kind: ProviderKind,
    /// Presence of this variable registers the slot
    trigger: &'static str,
    base_url: &'static str,
    model: &'static str,
    fallback: &'static str,
}

const PROVIDER_ENV: [ProviderEnv; 4] = [
    ProviderEnv {
        slot: "claude",
        kind: ProviderKind::Anthropic,
        trigger: "ANTHROPIC_API_KEY",
        base_url: "ANTHROPIC_BASE_URL",
        model: "ANTHROPIC_MODEL",
        fallback: "ANTHROPIC_FALLBACK_MODEL",
    },
    ProviderEnv {
        slot: "gemini",
        kind: ProviderKind::Google,
        trigger: "GOOGLE_API_KEY",
        base_url: "GOOGLE_BASE_URL",
        model: "GOOGLE_MODEL",
        fallback: "GOOGLE_FALLBACK_MODEL",
    },
    ProviderEnv {
        slot: "openai",
        kind: ProviderKind::OpenAi,
        trigger: "OPENAI_API_KEY",
        base_url: "OPENAI_BASE_URL",
        model: "OPENAI_MODEL",
        fallback: "OPENAI_FALLBACK_MODEL",
    },
    ProviderEnv {
        slot: "ollama",
        kind: ProviderKind::Ollama,
        trigger: "OLLAMA_MODEL",
        base_url: "OLLAMA_HOST",
        model: "OLLAMA_MODEL",
        fallback: "OLLAMA_FALLBACK_MODEL",
    },
];

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// `~/.config/xsh/config.yaml` (platform config dir).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xsh").join("config.yaml"))
    }

    /// Load the config file (if any) and overlay the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
    }

    /// Same as [`Config::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("XSH_CONFIG")
            .map(PathBuf::from)
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env(&lookup);
        Ok(config)
    }

    /// Overlays environment variables onto the loaded configuration.
    pub fn apply_env<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = lookup("SHELL") {
            self.shell.path = shell;
        }
        if let Some(key) = lookup("XSH_HOOK_KEY") {
            self.shell.hook_key = key;
        }
        if let Some(path) = lookup("XSH_LOG") {
            self.log.path = Some(PathBuf::from(path));
        }
        if let Some(filter) = lookup("XSH_LOG_LEVEL") {
            self.log.filter = filter;
        }

        for env in &PROVIDER_ENV {
            let trigger = lookup(env.trigger);
            if trigger.is_none() && !self.llm.models.contains_key(env.slot) {
                continue;
            }

            let entry = self
                .llm
                .models
                .entry(env.slot.to_string())
                .or_insert_with(|| ModelConfig::new(env.kind));

            if let Some(api_key) = trigger.filter(|_| env.kind.requires_api_key()) {
                entry.api_key = Some(api_key);
            }
            if let Some(base_url) = lookup(env.base_url) {
                entry.base_url = base_url;
            }
            if let Some(model) = lookup(env.model) {
                entry.model = model;
            }
            if let Some(fallback) = lookup(env.fallback) {
                entry.fallback_model = Some(fallback);
            }
        }

        self.llm.resolve_current(lookup("XSH_MODEL").as_deref());
    }
}
