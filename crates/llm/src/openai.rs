//! OpenAI-shape chat client.
//!
//! One client covers every endpoint speaking the `/chat/completions` wire
//! format. The host is selected from the model string: Groq, Cerebras, and
//! xAI models route to their own APIs, everything else to OpenAI. Explicit
//! `base_url`/`api_key` on the request override both the routing table and
//! the environment.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{
    ChatChoice, ChatRequest, ChatResponse, ResponseMessage, ResponseToolCall, ToolChoice, Usage,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Known OpenAI-compatible hosts, selected by model substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    OpenAi,
    Groq,
    Cerebras,
    Xai,
}

impl Host {
    /// Pick the host for a model string.
    pub fn for_model(model: &str) -> Self {
        let lower = model.to_ascii_lowercase();
        if lower.contains("groq") || lower.starts_with("llama-3") {
            Self::Groq
        } else if lower.contains("cerebras") {
            Self::Cerebras
        } else if lower.contains("grok") {
            Self::Xai
        } else {
            Self::OpenAi
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Cerebras => "https://api.cerebras.ai/v1",
            Self::Xai => "https://api.x.ai/v1",
        }
    }

    fn key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Cerebras => "CEREBRAS_API_KEY",
            Self::Xai => "XAI_API_KEY",
        }
    }

    fn url_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::Groq => "GROQ_BASE_URL",
            Self::Cerebras => "CEREBRAS_BASE_URL",
            Self::Xai => "XAI_BASE_URL",
        }
    }
}

/// Client for every OpenAI-shape endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    default_model: String,
}

impl OpenAiCompatClient {
    pub fn new(default_model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn resolve(&self, request: &ChatRequest) -> (String, String, Option<String>) {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let host = Host::for_model(&model);
        let base_url = request
            .base_url
            .clone()
            .or_else(|| std::env::var(host.url_env()).ok())
            .unwrap_or_else(|| host.base_url().to_string());
        let api_key = request
            .api_key
            .clone()
            .or_else(|| std::env::var(host.key_env()).ok());
        (model, base_url, api_key)
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let (model, base_url, api_key) = self.resolve(request);
        let body = build_request_body(request, &model);
        debug!(%model, %base_url, "chat completion dispatch");

        let mut builder = self
            .client
            .post(format!("{base_url}/chat/completions"))
            .json(&body);
        if let Some(key) = &api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(LlmError::ModelUnavailable(model));
            }
            return Err(LlmError::request_failed(Some(status.as_u16()), message));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(wire.into_unified())
    }
}

#[async_trait::async_trait]
impl crate::ChatProvider for OpenAiCompatClient {
    async fn chat(&self, request: ChatRequest) -> crate::Result<ChatResponse> {
        let policy = request.retry.unwrap_or_default();
        retry_with_backoff(policy, || self.dispatch(&request)).await
    }
}

/// Build the `/chat/completions` body for a unified request.
pub fn build_request_body(request: &ChatRequest, model: &str) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
        "stream": false,
    });
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(m) = request.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if let Some(rf) = &request.response_format {
        body["response_format"] = rf.clone();
    }
    if let Some(tools) = &request.tools {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        );
    }
    if let Some(choice) = &request.tool_choice {
        body["tool_choice"] = match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Required => json!("required"),
        };
    }
    body
}

// Wire shapes, kept private; only the unified types escape this module.

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

impl WireResponse {
    pub(crate) fn into_unified(self) -> ChatResponse {
        ChatResponse {
            id: self
                .id
                .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())),
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            choices: self
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    message: ResponseMessage {
                        role: c.message.role,
                        content: c.message.content.unwrap_or_default(),
                        tool_calls: c.message.tool_calls.map(|calls| {
                            calls
                                .into_iter()
                                .map(|tc| ResponseToolCall {
                                    id: tc.id,
                                    name: tc.function.name,
                                    arguments: tc.function.arguments,
                                })
                                .collect()
                        }),
                    },
                })
                .collect(),
        }
    }
}

/// Parse an OpenAI-shape response body into the unified shape.
pub fn parse_response_json(raw: &str) -> Result<ChatResponse, LlmError> {
    let wire: WireResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    Ok(wire.into_unified())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn test_host_selection_on_model_string() {
        assert_eq!(Host::for_model("gpt-4o-mini"), Host::OpenAi);
        assert_eq!(Host::for_model("llama-3.3-70b-groq"), Host::Groq);
        assert_eq!(Host::for_model("llama-3.1-8b-instant"), Host::Groq);
        assert_eq!(Host::for_model("cerebras-llama"), Host::Cerebras);
        assert_eq!(Host::for_model("grok-4"), Host::Xai);
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ])
        .with_temperature(0.1)
        .with_max_tokens(64);

        let body = build_request_body(&request, "gpt-4o-mini");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = r#"{
            "id": "chatcmpl-abc",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "write_file", "arguments": "{\"path\": \"a.txt\"}"}
                    }]
                }
            }]
        }"#;

        let response = parse_response_json(raw).unwrap();
        assert_eq!(response.id, "chatcmpl-abc");
        assert_eq!(response.usage.as_ref().unwrap().total_tokens, 15);
        assert_eq!(response.tool_calls()[0].name, "write_file");
        assert_eq!(response.content(), Some(""));
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_response_json("not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
