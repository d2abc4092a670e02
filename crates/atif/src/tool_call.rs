use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured tool or function invocation made by the agent.
///
/// The `tool_call_id` is referenced by later observation results via
/// `source_call_id`, correlating actions with their outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this specific tool call
    pub tool_call_id: String,

    /// The name of the function or tool being invoked
    ///
    /// Examples: "run_command", "write_file", "web_search"
    pub function_name: String,

    /// Arguments passed to the function
    ///
    /// Must be a valid JSON object, but can be empty (`{}`) if no arguments needed.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(
        tool_call_id: impl Into<String>,
        function_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            function_name: function_name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_round_trip() {
        let call = ToolCall::new("tc-1", "run_command", json!({"command": "ls"}));
        let json = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(call, back);
    }
}
