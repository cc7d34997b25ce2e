//! Google Gemini (generativelanguage) provider.

use super::types::*;
use crate::config::ModelConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: &ModelConfig, http_client: reqwest::Client) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey(ProviderKind::Google))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );

        let body = GenerateRequest {
            system_instruction: request.system_prompt().map(|text| GoogleContent {
                role: None,
                parts: vec![GooglePart { text }],
            }),
            contents: request
                .conversation()
                .map(|m| {
                    // Gemini calls the assistant role "model"
                    let role = if m.role == "assistant" { "model" } else { "user" };
                    GoogleContent {
                        role: Some(role.to_string()),
                        parts: vec![GooglePart {
                            text: m.content.clone(),
                        }],
                    }
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, &request.model).await?;

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("key", &self.api_key)])
            .send()
            .await?;
        let response = ensure_success(response, "").await?;

        let parsed: ModelsResponse = response.json().await?;
        let models = parsed
            .models
            .into_iter()
            .filter(|m| m.name.contains("gemini"))
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| match m.name.rsplit_once('/') {
                Some((_, id)) => id.to_string(),
                None => m.name,
            })
            .collect();
        Ok(models)
    }
}

// Gemini-specific request/response types (internal)

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    contents: Vec<GoogleContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<GoogleContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
