//! Anthropic messages API mapped onto the unified chat shape.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::retry::retry_with_backoff;
use crate::types::{
    ChatChoice, ChatRequest, ChatResponse, ResponseMessage, ResponseToolCall, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    client: Client,
    default_model: String,
}

impl AnthropicClient {
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
            .or_else(|| std::env::var("ANTHROPIC_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = request
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| LlmError::request_failed(None, "ANTHROPIC_API_KEY not set"))?;

        // System prompt travels in its own field on this API.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        debug!(%model, "anthropic dispatch");
        let response = self
            .client
            .post(format!("{base_url}/v1/messages"))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(Some(status.as_u16()), message));
        }

        let wire: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(wire.into_unified())
    }
}

#[async_trait::async_trait]
impl crate::ChatProvider for AnthropicClient {
    async fn chat(&self, request: ChatRequest) -> crate::Result<ChatResponse> {
        let policy = request.retry.unwrap_or_default();
        retry_with_backoff(policy, || self.dispatch(&request)).await
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}

impl MessagesResponse {
    fn into_unified(self) -> ChatResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ResponseToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                ContentBlock::Other => {}
            }
        }

        ChatResponse {
            id: self.id,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    role: "assistant".into(),
                    content,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_response_maps_to_unified() {
        let raw = r#"{
            "id": "msg_01",
            "content": [
                {"type": "text", "text": "Running it."},
                {"type": "tool_use", "id": "toolu_1", "name": "run_command", "input": {"command": "ls"}}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }"#;
        let wire: MessagesResponse = serde_json::from_str(raw).unwrap();
        let unified = wire.into_unified();

        assert_eq!(unified.content(), Some("Running it."));
        assert_eq!(unified.tool_calls()[0].name, "run_command");
        assert_eq!(unified.usage.as_ref().unwrap().total_tokens, 19);
    }
}
