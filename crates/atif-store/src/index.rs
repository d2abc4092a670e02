use atif::{Agent, FinalMetrics};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a streamed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryStatus {
    InProgress,
    Complete,
    Failed,
}

/// Resume point for a streamed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Highest step ID written so far
    pub step_id: i64,
    /// ISO 8601 time of the last index update
    pub timestamp: String,
    /// Number of steps the writer has appended
    pub completed_step_count: i64,
}

/// Small sidecar next to the JSONL log, rewritten atomically on every step.
///
/// Consumers poll this instead of tailing the log; after a crash it tells a
/// resuming process exactly how far the stream got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryIndex {
    pub session_id: String,
    pub agent: Agent,
    pub checkpoint: Checkpoint,
    pub status: TrajectoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_metrics: Option<FinalMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
}
