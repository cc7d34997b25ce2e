//! The assistant contract consumed by the shell wrapper, and its provider-backed
//! implementation.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{Config, LlmConfig};
use crate::models::{ModelInfo, ModelRegistry};
use crate::provider::{self, CompletionRequest, ErrorKind, Message, ProviderError, Result};

/// What the wrapper needs from the AI layer.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Ask for shell commands matching a natural-language request.
    async fn query(&self, prompt: &str) -> Result<String>;

    /// Models the user can switch to.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    async fn switch_model(&self, model: &ModelInfo) -> Result<()>;

    fn current_model(&self) -> Option<ModelInfo>;
}

/// Which failures trigger a single retry on the slot's fallback model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub fallback_on: Vec<ErrorKind>,
}

impl RetryPolicy {
    pub fn should_fallback(&self, err: &ProviderError) -> bool {
        self.fallback_on.contains(&err.kind())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fallback_on: vec![ErrorKind::ModelUnavailable],
        }
    }
}

/// [`Assistant`] backed by the configured model slots.
pub struct AiClient {
    llm: RwLock<LlmConfig>,
    system_prompt: String,
    shell: String,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl AiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()?;

        Ok(Self {
            llm: RwLock::new(config.llm.clone()),
            system_prompt: config.system_prompt.clone(),
            shell: config.shell.path.clone(),
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    fn llm(&self) -> RwLockReadGuard<'_, LlmConfig> {
        self.llm.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn llm_mut(&self) -> RwLockWriteGuard<'_, LlmConfig> {
        self.llm.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn system_message(&self) -> Message {
        Message::system(format!(
            "{}\n\nCurrent shell: {}\nOS: {}",
            self.system_prompt,
            self.shell,
            std::env::consts::OS
        ))
    }
}

#[async_trait]
impl Assistant for AiClient {
    async fn query(&self, prompt: &str) -> Result<String> {
        let (key, slot, max_tokens, temperature) = {
            let llm = self.llm();
            let (key, slot) = llm.current_model().ok_or(ProviderError::NotConfigured)?;
            (key.to_string(), slot.clone(), llm.max_tokens, llm.temperature)
        };

        let provider = provider::build(&slot, self.http_client.clone())?;
        let mut request = CompletionRequest::new(
            slot.model.clone(),
            vec![self.system_message(), Message::user(prompt)],
        )
        .with_max_tokens(max_tokens)
        .with_temperature(temperature);

        debug!(slot = %key, model = %slot.model, "querying assistant");
        let err = match provider.complete(request.clone()).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        let fallback = slot
            .fallback_model
            .filter(|fallback| *fallback != slot.model);
        let Some(fallback) = fallback.filter(|_| self.retry.should_fallback(&err)) else {
            return Err(err);
        };

        warn!(model = %slot.model, fallback = %fallback, error = %err, "retrying with fallback model");
        request.model = fallback.clone();
        let text = provider.complete(request).await?;

        if let Some(slot) = self.llm_mut().models.get_mut(&key) {
            slot.model = fallback;
        }
        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let (key, slot, others) = {
            let llm = self.llm();
            let (key, slot) = llm.current_model().ok_or(ProviderError::NotConfigured)?;
            let others: Vec<ModelInfo> = llm
                .models
                .iter()
                .filter(|(other, _)| other.as_str() != key)
                .map(|(other, cfg)| ModelInfo::new(other.clone(), cfg.model.clone(), cfg.provider))
                .collect();
            (key.to_string(), slot.clone(), others)
        };

        let names = match provider::build(&slot, self.http_client.clone()) {
            Ok(provider) => provider.list_models().await,
            Err(err) => Err(err),
        };
        let names = names.unwrap_or_else(|err| {
            warn!(provider = %slot.provider, error = %err, "model listing failed, offering configured model");
            Vec::new()
        });

        let mut registry = ModelRegistry::for_slot(&key, slot.provider, names);
        registry.insert(ModelInfo::new(key.clone(), slot.model.clone(), slot.provider));
        for model in others {
            registry.insert(model);
        }
        Ok(registry.into_models())
    }

    async fn switch_model(&self, model: &ModelInfo) -> Result<()> {
        let mut llm = self.llm_mut();

        let key = if llm
            .models
            .get(&model.key)
            .is_some_and(|slot| slot.provider == model.provider)
        {
            model.key.clone()
        } else {
            llm.models
                .iter()
                .find(|(_, slot)| slot.provider == model.provider)
                .map(|(key, _)| key.clone())
                .ok_or_else(|| ProviderError::UnknownModel(model.name.clone()))?
        };

        if let Some(slot) = llm.models.get_mut(&key) {
            slot.model = model.name.clone();
        }
        llm.current = Some(key.clone());
        info!(slot = %key, model = %model.name, "switched model");
        Ok(())
    }

    fn current_model(&self) -> Option<ModelInfo> {
        self.llm()
            .current_model()
            .map(|(key, slot)| ModelInfo::new(key, slot.model.clone(), slot.provider))
    }
}
