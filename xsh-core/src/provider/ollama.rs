//! Ollama provider implementation.
//!
//! Talks to a local Ollama HTTP API. Chat responses are streamed as
//! newline-delimited JSON and aggregated into a single completion.

use super::types::*;
use crate::config::ModelConfig;
use async_trait::async_trait;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &ModelConfig, http_client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let ollama_request = OllamaChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                opts.insert("num_predict".to_string(), serde_json::json!(request.max_tokens));
                opts
            },
            stream: true,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await?;
        let response = ensure_success(response, &request.model).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut content = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                if absorb_line(&line, &mut content)? {
                    return Ok(content);
                }
            }
        }

        // Trailing line without newline
        absorb_line(&buffer, &mut content)?;
        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        let response = ensure_success(response, "").await?;

        let tags: OllamaTags = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Appends one NDJSON line to `content`. Returns true once the stream reports `done`.
fn absorb_line(line: &[u8], content: &mut String) -> Result<bool> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let chunk: OllamaChatResponse = serde_json::from_str(text)?;
    if let Some(error) = chunk.error {
        return Err(ProviderError::Other(error));
    }
    if let Some(message) = chunk.message {
        content.push_str(&message.content);
    }
    Ok(chunk.done)
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    options: HashMap<String, serde_json::Value>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OllamaProvider {
        let config = ModelConfig::new(ProviderKind::Ollama).with_base_url(server.uri());
        OllamaProvider::new(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_streamed_chunks_are_aggregated() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"SHELL_COMMANDS:\\n\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"git status\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen2.5-coder:1.5b",
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let request = CompletionRequest::new("qwen2.5-coder:1.5b", vec![Message::user("status")]);
        let text = provider(&server).complete(request).await.unwrap();
        assert_eq!(text, "SHELL_COMMANDS:\ngit status");
    }

    #[tokio::test]
    async fn test_stream_error_line() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"error\":\"out of memory\"}"))
            .mount(&server)
            .await;

        let request = CompletionRequest::new("big", vec![Message::user("x")]);
        let err = provider(&server).complete(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Other(ref msg) if msg == "out of memory"));
    }

    #[tokio::test]
    async fn test_missing_model_404() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string("{\"error\":\"model 'nope' not found\"}"),
            )
            .mount(&server)
            .await;

        let request = CompletionRequest::new("nope", vec![Message::user("x")]);
        let err = provider(&server).complete(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn test_list_models_from_tags() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3:8b"}, {"name": "qwen2.5-coder:1.5b"}]
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["llama3:8b", "qwen2.5-coder:1.5b"]);
    }
}
