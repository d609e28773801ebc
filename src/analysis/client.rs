//! HTTP client for a Messages-style model API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::LlmConfig;

use super::{ExplanatoryModel, ModelError, ModelResponse};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct MessagesClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl MessagesClient {
    /// Same client with a different model id and completion cap
    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

fn classify_status(status: StatusCode, body: String) -> ModelError {
    match status.as_u16() {
        429 | 529 => ModelError::Throttled(body),
        400 | 422 => ModelError::InvalidRequest(body),
        404 => ModelError::NotFound(body),
        500..=599 => ModelError::Unavailable(format!("{status}: {body}")),
        _ => ModelError::InvalidRequest(format!("{status}: {body}")),
    }
}

#[async_trait]
impl ExplanatoryModel for MessagesClient {
    #[instrument(skip(self, prompt, system), fields(model = %self.model))]
    async fn invoke(&self, prompt: &str, system: Option<&str>) -> Result<ModelResponse, ModelError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("model API error [{status}]: {body}");
            return Err(classify_status(status, body));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ModelError::Malformed("no text content in response".to_string()))?;

        debug!(
            "model response: {} tokens ({} in, {} out)",
            body.usage.input_tokens + body.usage.output_tokens,
            body.usage.input_tokens,
            body.usage.output_tokens
        );

        Ok(ModelResponse {
            text,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        })
    }
}
