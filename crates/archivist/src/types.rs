//! Trajectory and pattern records, serialized camelCase as the workspace's
//! other tools wrote them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action type in a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ToolCall,
    Thinking,
    Output,
    Error,
}

/// A recorded action in a trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Tool name if tool_call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: String,
}

/// Outcome of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrajectoryOutcome {
    Success,
    Failure,
    Partial,
    Timeout,
}

/// Token usage for a trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// A complete record of one task attempt, as the archivist consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "taskDescription")]
    pub task_description: String,
    pub actions: Vec<TrajectoryAction>,
    pub outcome: TrajectoryOutcome,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "skillsUsed")]
    pub skills_used: Vec<String>,
    #[serde(rename = "filesModified")]
    pub files_modified: Vec<String>,
    #[serde(rename = "totalDurationMs")]
    pub total_duration_ms: u64,
    pub model: String,
    pub tokens: TokenUsage,
    pub timestamp: String,
    /// Which episode produced this attempt
    #[serde(rename = "episodeId", skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    /// Whether this trajectory has been archived
    pub archived: bool,
}

impl Trajectory {
    /// First tool this trajectory reached for, the crude similarity key.
    pub fn first_tool(&self) -> &str {
        self.actions
            .iter()
            .find(|a| a.action_type == ActionType::ToolCall)
            .and_then(|a| a.tool.as_deref())
            .unwrap_or("unknown")
    }

    pub fn is_within_age(&self, max_age_days: u32) -> bool {
        let Ok(timestamp) = DateTime::parse_from_rfc3339(&self.timestamp) else {
            return false;
        };
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
        timestamp.with_timezone(&Utc) > cutoff
    }
}

/// Pattern type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Skill,
    Convention,
    Antipattern,
    Optimization,
}

/// A pattern identified across trajectories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub name: String,
    pub description: String,
    /// The code or approach to reuse
    pub content: String,
    /// When to reach for this pattern
    #[serde(rename = "triggerContext")]
    pub trigger_context: Vec<String>,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    /// Number of trajectories this was seen in
    pub occurrences: u32,
    #[serde(rename = "sourceTrajectoryIds")]
    pub source_trajectory_ids: Vec<String>,
    /// Confidence in this pattern (0-1)
    pub confidence: f64,
    pub category: String,
    pub tags: Vec<String>,
    #[serde(rename = "extractedAt")]
    pub extracted_at: String,
}

/// Generate a unique trajectory ID.
pub fn generate_trajectory_id() -> String {
    format!("traj-{}", unique_suffix())
}

/// Generate a unique pattern ID carrying a type prefix.
pub fn generate_pattern_id(pattern_type: &str) -> String {
    let prefix = &pattern_type[..pattern_type.len().min(3)];
    format!("pat-{prefix}-{}", unique_suffix())
}

/// Generate a unique archive-run ID.
pub fn generate_archive_id() -> String {
    format!("arch-{}", unique_suffix())
}

/// Generate a unique skill ID.
pub fn generate_skill_id() -> String {
    format!("skill-{}", unique_suffix())
}

/// Generate a unique episodic-memory ID.
pub fn generate_memory_id() -> String {
    format!("mem-{}", unique_suffix())
}

fn unique_suffix() -> String {
    let millis = Utc::now().timestamp_millis() as u64;
    format!("{}-{}", base36(millis), base36_random(6))
}

fn base36(mut n: u64) -> String {
    const CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(CHARS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 output is ascii")
}

fn base36_random(len: usize) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    const CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(1);
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        out.push(CHARS[(seed % 36) as usize]);
    }
    String::from_utf8(out).expect("base36 output is ascii")
}
