use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Metrics, Observation, ToolCall};

/// The originator of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepSource {
    System,
    User,
    Agent,
}

impl StepSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// A single step in the trajectory: a system prompt, user message, or a
/// complete agent turn (inference, tool calls, and observation receipt).
///
/// Timestamps are kept as ISO 8601 strings so that a trajectory read from
/// disk can be validated rather than rejected at parse time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Ordinal index of the turn (starting from 1)
    pub step_id: i64,

    /// ISO 8601 timestamp with a literal 'T' separator
    ///
    /// Example: "2025-10-16T14:30:00Z"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// The originator of this step
    pub source: StepSource,

    /// The specific LLM model used for this turn
    ///
    /// Only applicable when source is "agent". If omitted, the model is
    /// inferred from the top-level agent configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// The dialogue message
    ///
    /// - system steps: the system prompt
    /// - user steps: the user's instruction
    /// - agent steps: the assistant's response
    ///
    /// Required, but can be an empty string.
    pub message: String,

    /// Explicit internal reasoning by the agent
    ///
    /// Only applicable when source is "agent".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// Structured tool/function calls produced by this turn
    ///
    /// Only applicable when source is "agent".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Environment feedback after actions or system events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,

    /// Token and cost accounting for this step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,

    /// Custom step-level metadata not covered by the core schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl Step {
    fn new(step_id: i64, source: StepSource, message: impl Into<String>) -> Self {
        Self {
            step_id,
            timestamp: Some(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
            source,
            model_name: None,
            message: message.into(),
            reasoning_content: None,
            tool_calls: None,
            observation: None,
            metrics: None,
            extra: None,
        }
    }

    /// Create a user step stamped with the current time.
    pub fn user(step_id: i64, message: impl Into<String>) -> Self {
        Self::new(step_id, StepSource::User, message)
    }

    /// Create a system step stamped with the current time.
    pub fn system(step_id: i64, message: impl Into<String>) -> Self {
        Self::new(step_id, StepSource::System, message)
    }

    /// Create an agent step stamped with the current time.
    pub fn agent(step_id: i64, message: impl Into<String>) -> Self {
        Self::new(step_id, StepSource::Agent, message)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Set the model name (agent steps only)
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Set reasoning content (agent steps only)
    pub fn with_reasoning_content(mut self, content: impl Into<String>) -> Self {
        self.reasoning_content = Some(content.into());
        self
    }

    /// Set tool calls (agent steps only)
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observation = Some(observation);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
