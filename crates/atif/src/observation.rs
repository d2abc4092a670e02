use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment feedback after actions or system events.
///
/// For agent steps, results stem from structured tool calls, non-tool actions,
/// or subagent delegation. For system steps, observations may carry results of
/// system-initiated operations (context management, environment reset,
/// checkpoint creation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// One result per tool call or action
    pub results: Vec<ObservationResult>,
}

impl Observation {
    pub fn new(results: Vec<ObservationResult>) -> Self {
        Self { results }
    }

    pub fn single(result: ObservationResult) -> Self {
        Self {
            results: vec![result],
        }
    }
}

/// Individual result from a tool execution or action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationResult {
    /// The `tool_call_id` this result corresponds to
    ///
    /// If omitted, the result comes from an action outside the standard tool
    /// calling format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_call_id: Option<String>,

    /// The textual output of the tool execution or action
    ///
    /// May be omitted when `subagent_trajectory_ref` is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// References to delegated subagent trajectories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_trajectory_ref: Option<Vec<SubagentTrajectoryRef>>,
}

impl ObservationResult {
    pub fn with_content(source_call_id: Option<String>, content: impl Into<String>) -> Self {
        Self {
            source_call_id,
            content: Some(content.into()),
            subagent_trajectory_ref: None,
        }
    }

    pub fn with_subagent(
        source_call_id: Option<String>,
        subagent_refs: Vec<SubagentTrajectoryRef>,
    ) -> Self {
        Self {
            source_call_id,
            content: None,
            subagent_trajectory_ref: Some(subagent_refs),
        }
    }
}

/// Reference to a delegated subagent trajectory.
///
/// Parent and child sessions form a tree; the ref carries only the child
/// session ID plus an optional path hint so consumers can resolve the full
/// trajectory lazily.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubagentTrajectoryRef {
    /// The session ID of the delegated subagent trajectory
    pub session_id: String,

    /// Reference to the complete subagent trajectory file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory_path: Option<String>,

    /// Custom metadata about the subagent execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl SubagentTrajectoryRef {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            trajectory_path: None,
            extra: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.trajectory_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_content() {
        let result = ObservationResult::with_content(Some("tc-1".into()), "exit code 0");
        assert_eq!(result.source_call_id.as_deref(), Some("tc-1"));
        assert!(result.subagent_trajectory_ref.is_none());
    }

    #[test]
    fn test_result_with_subagent_ref() {
        let child = SubagentTrajectoryRef::new("session-2025-01-01T00-00-00-abc123")
            .with_path("20250101/session-2025-01-01T00-00-00-abc123.atif.json");
        let result = ObservationResult::with_subagent(None, vec![child]);
        assert!(result.content.is_none());
        assert_eq!(result.subagent_trajectory_ref.as_ref().unwrap().len(), 1);
    }
}
