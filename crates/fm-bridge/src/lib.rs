//! # FM Bridge client
//!
//! Client for the local Foundation Models HTTP bridge: health checks, chat
//! completions (OpenAI shape), and model listing, plus the machinery around
//! tiny on-device models:
//!
//! - lock-guarded auto-start so concurrent processes converge on one bridge
//! - a single-turn worker prompt with a forgiving tool-call parser
//! - deterministic context truncation for small context windows

pub mod autostart;
pub mod client;
pub mod truncate;
pub mod worker;

pub use autostart::{BridgeLauncher, LaunchConfig};
pub use client::{FmBridgeClient, HealthStatus, ModelInfo};
pub use truncate::{DEFAULT_CHAR_BUDGET, truncate_messages_for_fm};
pub use worker::{FmToolParseError, ParseFailureReason, ParsedToolCall, WorkerPrompt};

pub type Result<T> = std::result::Result<T, llm::LlmError>;
