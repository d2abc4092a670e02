//! OpenRouter client: OpenAI wire format on a fixed host, with the
//! attribution headers the service expects.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::LlmError;
use crate::openai::build_request_body;
use crate::retry::retry_with_backoff;
use crate::types::{ChatRequest, ChatResponse};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Model slug for the free routing tier used by the meta-reasoner.
pub const FREE_ROUTER_MODEL: &str = "openrouter/auto";

pub struct OpenRouterClient {
    client: Client,
    default_model: String,
}

impl OpenRouterClient {
    pub fn new(default_model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
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
            .or_else(|| std::env::var("OPENROUTER_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = request
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .ok_or_else(|| LlmError::request_failed(None, "OPENROUTER_API_KEY not set"))?;

        let body = build_request_body(request, &model);
        debug!(%model, "openrouter dispatch");

        let response = self
            .client
            .post(format!("{base_url}/chat/completions"))
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://openagents.com")
            .header("X-Title", "OpenAgents")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(Some(status.as_u16()), message));
        }

        let raw = response.text().await?;
        crate::openai::parse_response_json(&raw)
    }
}

#[async_trait::async_trait]
impl crate::ChatProvider for OpenRouterClient {
    async fn chat(&self, request: ChatRequest) -> crate::Result<ChatResponse> {
        let policy = request.retry.unwrap_or_default();
        retry_with_backoff(policy, || self.dispatch(&request)).await
    }
}
