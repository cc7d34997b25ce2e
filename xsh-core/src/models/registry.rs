use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// A model the user can switch to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Configured slot the model belongs to
    pub key: String,
    /// Vendor model id
    pub name: String,
    pub provider: ProviderKind,
}

impl ModelInfo {
    pub fn new(key: impl Into<String>, name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            provider,
        }
    }

    /// Same vendor model, regardless of slot.
    pub fn same_model(&self, other: &ModelInfo) -> bool {
        self.provider == other.provider && self.name == other.name
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.provider)
    }
}

/// Ordered, de-duplicated list of selectable models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the models one slot's provider reports.
    pub fn for_slot<I, S>(key: &str, provider: ProviderKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.insert(ModelInfo::new(key, name, provider));
        }
        registry
    }

    /// Adds a model unless the same vendor model is already listed.
    pub fn insert(&mut self, model: ModelInfo) -> bool {
        if self.models.iter().any(|m| m.same_model(&model)) {
            return false;
        }
        self.models.push(model);
        true
    }

    pub fn into_models(self) -> Vec<ModelInfo> {
        self.models
    }
}
