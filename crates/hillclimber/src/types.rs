use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A Terminal-Bench task as the climber sees it: an ID, the natural-language
/// description, and how to verify a solution. The description is the only
/// task knowledge the agent ever receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalBenchTask {
    pub id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub verification: VerificationConfig,
}

/// How solutions get verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Container image running pytest
    pub docker_image: String,
    pub timeout_secs: u64,
    /// Directory inside the workspace holding generated tests
    pub tests_dir: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            docker_image: "python:3.11-slim".to_string(),
            timeout_secs: 120,
            tests_dir: "tests".to_string(),
        }
    }
}

/// The tunable configuration tuple for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillClimberConfigInput {
    pub task_id: String,
    /// Extra guidance prepended to the agent prompt
    pub hint: Option<String>,
    /// Whether learned skills are injected
    pub use_skills: bool,
    pub max_turns_override: Option<u32>,
}

impl HillClimberConfigInput {
    pub fn default_for(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            hint: None,
            use_skills: false,
            max_turns_override: None,
        }
    }

    /// Stable fingerprint over the exact enumerated fields. Identical tuples
    /// always share a hash; any field change produces a new one.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"hillclimber-config-v1");
        hasher.update(self.task_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.hint.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update([self.use_skills as u8]);
        hasher.update(self.max_turns_override.unwrap_or(0).to_le_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

/// A stored configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillClimberConfig {
    pub id: i64,
    pub task_id: String,
    pub hint: Option<String>,
    pub use_skills: bool,
    pub max_turns_override: Option<u32>,
    pub config_hash: String,
    pub created_at: String,
}

impl HillClimberConfig {
    pub fn as_input(&self) -> HillClimberConfigInput {
        HillClimberConfigInput {
            task_id: self.task_id.clone(),
            hint: self.hint.clone(),
            use_skills: self.use_skills,
            max_turns_override: self.max_turns_override,
        }
    }
}

/// Outcome of one task execution under the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub passed: bool,
    pub turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Up to the three most recent step descriptions, for the meta prompt
    pub step_summary: Vec<String>,
}

impl TaskRunResult {
    pub fn new(passed: bool, turns: u32) -> Self {
        Self {
            passed,
            turns,
            error_message: None,
            step_summary: Vec::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// Keep only the three most recent entries.
    pub fn with_step_summary(mut self, mut steps: Vec<String>) -> Self {
        if steps.len() > 3 {
            steps.drain(..steps.len() - 3);
        }
        self.step_summary = steps;
        self
    }
}

/// A proposed change to the configuration tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigChange {
    Keep {
        reasoning: String,
    },
    UpdateHint {
        new_hint: String,
        reasoning: String,
    },
    ToggleSkills {
        use_skills: bool,
        reasoning: String,
    },
    AdjustTurns {
        max_turns: u32,
        reasoning: String,
    },
}

impl ConfigChange {
    /// Apply the change to a configuration tuple. `Keep` returns an
    /// equivalent tuple (same hash).
    pub fn apply(&self, input: &HillClimberConfigInput) -> HillClimberConfigInput {
        let mut next = input.clone();
        match self {
            Self::Keep { .. } => {}
            Self::UpdateHint { new_hint, .. } => next.hint = Some(new_hint.clone()),
            Self::ToggleSkills { use_skills, .. } => next.use_skills = *use_skills,
            Self::AdjustTurns { max_turns, .. } => next.max_turns_override = Some(*max_turns),
        }
        next
    }

    pub fn reasoning(&self) -> &str {
        match self {
            Self::Keep { reasoning }
            | Self::UpdateHint { reasoning, .. }
            | Self::ToggleSkills { reasoning, .. }
            | Self::AdjustTurns { reasoning, .. } => reasoning,
        }
    }
}

/// One run to persist, already scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillClimberRunInput {
    pub run_id: String,
    pub task_id: String,
    pub config_id: i64,
    pub passed: bool,
    pub turns: u32,
    pub duration_ms: u64,
    pub step_summary: Option<Vec<String>>,
    pub error_message: Option<String>,
    pub meta_model: Option<String>,
    pub proposed_change: Option<String>,
    pub change_accepted: bool,
    pub score: i64,
}

/// A stored run row with its assigned ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HillClimberRun {
    pub id: i64,
    pub run_number: i64,
    #[serde(flatten)]
    pub input: HillClimberRunInput,
    pub created_at: String,
}
