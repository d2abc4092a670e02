//! HTTP client for the bridge protocol.
//!
//! `GET /health`, `POST /v1/chat/completions` (OpenAI shape, `stream=false`),
//! `GET /v1/models`. Error bodies look like `{error:{message,type,code?}}`.

use std::time::Duration;

use llm::{ChatRequest, ChatResponse, LlmError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11535";

/// Chat requests against a local model default to a generous timeout; small
/// models can take minutes on a cold start.
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Payload of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_available: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl HealthStatus {
    pub fn is_running(&self) -> bool {
        self.status == "server_running" || self.status == "ok"
    }
}

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct BridgeErrorBody {
    error: BridgeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct BridgeErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Client handle for one bridge instance.
#[derive(Clone)]
pub struct FmBridgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl FmBridgeClient {
    /// Connect to the default local bridge, honoring `FM_BRIDGE_URL`.
    pub fn local() -> Self {
        let base_url =
            std::env::var("FM_BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /health`. Connection refused maps to `ServerNotRunning`.
    pub async fn health(&self) -> crate::Result<HealthStatus> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::ServerNotRunning(self.base_url.clone()));
        }
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// `GET /v1/models`.
    pub async fn models(&self) -> crate::Result<Vec<ModelInfo>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(decode_bridge_error(status.as_u16(), &raw));
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(list.data)
    }

    /// `POST /v1/chat/completions` with `stream=false`.
    pub async fn chat_completion(&self, request: &ChatRequest) -> crate::Result<ChatResponse> {
        let model = request.model.as_deref().unwrap_or("foundation");
        let body = llm::openai::build_request_body(request, model);
        debug!(%model, base_url = %self.base_url, "fm chat completion");

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        let status = response.status();
        let raw = response.text().await.map_err(LlmError::from)?;
        if !status.is_success() {
            return Err(decode_bridge_error(status.as_u16(), &raw));
        }
        llm::openai::parse_response_json(&raw)
    }

    fn connect_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_connect() {
            LlmError::ServerNotRunning(self.base_url.clone())
        } else if err.is_timeout() {
            LlmError::Timeout(CHAT_TIMEOUT)
        } else {
            err.into()
        }
    }
}

#[async_trait::async_trait]
impl llm::ChatProvider for FmBridgeClient {
    async fn chat(&self, request: ChatRequest) -> llm::Result<ChatResponse> {
        self.chat_completion(&request).await
    }
}

fn decode_bridge_error(status: u16, raw: &str) -> LlmError {
    if let Ok(body) = serde_json::from_str::<BridgeErrorBody>(raw) {
        let detail = body.error;
        let label = detail.kind.or(detail.code).unwrap_or_default();
        if label.contains("model") || detail.message.contains("model") {
            return LlmError::ModelUnavailable(detail.message);
        }
        return LlmError::request_failed(Some(status), detail.message);
    }
    LlmError::request_failed(Some(status), raw.to_string())
}
