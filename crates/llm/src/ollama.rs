//! Ollama client, through its OpenAI-compatible endpoint on localhost.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::LlmError;
use crate::openai::build_request_body;
use crate::retry::retry_with_backoff;
use crate::types::{ChatRequest, ChatResponse};

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

pub struct OllamaClient {
    client: Client,
    default_model: String,
}

impl OllamaClient {
    pub fn new(default_model: impl Into<String>) -> Self {
        // Local models can be slow to load on first request.
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let base_url = request
            .base_url
            .clone()
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let body = build_request_body(request, &model);
        debug!(%model, %base_url, "ollama dispatch");

        let response = self
            .client
            .post(format!("{base_url}/chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::ServerNotRunning(base_url.clone())
                } else {
                    e.into()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(LlmError::ModelUnavailable(model));
            }
            return Err(LlmError::request_failed(Some(status.as_u16()), message));
        }

        let raw = response.text().await?;
        crate::openai::parse_response_json(&raw)
    }
}

#[async_trait::async_trait]
impl crate::ChatProvider for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> crate::Result<ChatResponse> {
        let policy = request.retry.unwrap_or_default();
        retry_with_backoff(policy, || self.dispatch(&request)).await
    }
}
