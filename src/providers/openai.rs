//! OpenAI-compatible embeddings and chat completions over HTTP
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint that follows
//! the `/embeddings` and `/chat/completions` request shapes.

use super::{Embedder, LanguageModel, UpstreamError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const SERVICE_LLM: &str = "language model";
const SERVICE_EMBED: &str = "embedding service";

/// HTTP client for an OpenAI-compatible API
///
/// One instance serves either completions or embeddings; the configured
/// `model` decides which endpoint makes sense.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    dimensions: Option<usize>,
}

impl OpenAiClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://api.openai.com/v1"
    /// * `api_key` - Bearer token; `None` for local servers without auth
    /// * `model` - Model name sent with every request
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature: 0.0,
            dimensions: None,
        }
    }

    /// Read the API key from the named environment variable
    ///
    /// A missing variable is only logged: local servers accept unauthenticated calls.
    pub fn from_env(base_url: &str, api_key_env: &str, model: &str) -> Self {
        let api_key = std::env::var(api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::debug!("{} not set, sending requests without authorization", api_key_env);
        }
        Self::new(base_url, api_key, model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Request reduced-size embeddings (text-embedding-3 models)
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn post_json(
        &self,
        service: &'static str,
        path: &str,
        body: &Value,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {} (model {})", url, self.model);

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(service, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(service, e))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                service,
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| UpstreamError::InvalidResponse {
            service,
            message: format!("Invalid JSON: {}", e),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false,
        });

        let response = self
            .post_json(SERVICE_LLM, "/chat/completions", &body)
            .await?;
        parse_completion(&response)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let mut body = json!({
            "model": self.model,
            "input": text,
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = json!(dimensions);
        }

        let response = self.post_json(SERVICE_EMBED, "/embeddings", &body).await?;
        parse_embedding(&response, self.dimensions)
    }
}

fn parse_completion(response: &Value) -> Result<String, UpstreamError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::InvalidResponse {
            service: SERVICE_LLM,
            message: "missing choices[0].message.content".to_string(),
        })
}

fn parse_embedding(response: &Value, expected: Option<usize>) -> Result<Vec<f32>, UpstreamError> {
    let values = response["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| UpstreamError::InvalidResponse {
            service: SERVICE_EMBED,
            message: "missing data[0].embedding".to_string(),
        })?;

    let embedding: Vec<f32> = values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| UpstreamError::InvalidResponse {
                service: SERVICE_EMBED,
                message: "non-numeric embedding component".to_string(),
            })
        })
        .collect::<Result<_, _>>()?;

    if let Some(expected) = expected {
        if embedding.len() != expected {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE_EMBED,
                message: format!(
                    "Dimension mismatch: expected {}, got {}",
                    expected,
                    embedding.len()
                ),
            });
        }
    }

    Ok(embedding)
}
