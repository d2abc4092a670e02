//! # LLM provider abstraction
//!
//! A single capability — `chat(request) → response` — unifying OpenAI-shape
//! endpoints (OpenAI, Groq, Cerebras, xAI), Anthropic, OpenRouter, and
//! Ollama behind one request/response shape. Retryable failures (network,
//! 5xx, 429, timeout) are recovered locally with exponential backoff and
//! jitter; everything else surfaces as a tagged [`LlmError`].

pub mod anthropic;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod retry;
pub mod types;

pub use anthropic::AnthropicClient;
pub use error::LlmError;
pub use ollama::OllamaClient;
pub use openai::OpenAiCompatClient;
pub use openrouter::OpenRouterClient;
pub use retry::RetryPolicy;
pub use types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ResponseMessage, ResponseToolCall,
    ToolChoice, ToolSpec, Usage,
};

pub type Result<T> = std::result::Result<T, LlmError>;

/// The one capability every backend provides.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}
