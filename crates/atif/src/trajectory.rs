use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AtifError, FinalMetrics, SCHEMA_VERSION, Step, validator};

/// Agent configuration identifying the agent system used for the trajectory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// The name of the agent system (e.g., "mechacoder", "claude-code")
    pub name: String,

    /// The version identifier of the agent system (e.g., "1.0.0")
    pub version: String,

    /// Default LLM model used for this trajectory
    ///
    /// Step-level model_name overrides this if specified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Custom agent configuration details not covered by the core schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl Agent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            model_name: None,
            extra: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

/// Root-level trajectory object storing global context and the complete
/// interaction history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    /// String defining ATIF compatibility (e.g., "ATIF-v1.4")
    pub schema_version: String,

    /// Unique identifier for the entire agent run
    pub session_id: String,

    /// Object specifying the agent configuration
    pub agent: Agent,

    /// Session ID of the parent trajectory, when this run was delegated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,

    /// ISO 8601 creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Ordered step objects representing the complete interaction history
    pub steps: Vec<Step>,

    /// Free-form developer notes, e.g. explanations for format discrepancies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Summary metrics for the entire trajectory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_metrics: Option<FinalMetrics>,

    /// Custom root-level metadata not covered by the core schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl Trajectory {
    /// Create a new trajectory with the v1.4 schema, stamped now.
    pub fn v1_4(session_id: impl Into<String>, agent: Agent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            session_id: session_id.into(),
            agent,
            parent_session_id: None,
            created_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
            steps: Vec::new(),
            notes: None,
            final_metrics: None,
            extra: None,
        }
    }

    pub fn with_parent(mut self, parent_session_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_session_id.into());
        self
    }

    pub fn with_final_metrics(mut self, metrics: FinalMetrics) -> Self {
        self.final_metrics = Some(metrics);
        self
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// All child session IDs referenced by observation subagent refs,
    /// in step order, deduplicated.
    pub fn child_session_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for step in &self.steps {
            let Some(observation) = &step.observation else {
                continue;
            };
            for result in &observation.results {
                let Some(refs) = &result.subagent_trajectory_ref else {
                    continue;
                };
                for r in refs {
                    if seen.insert(r.session_id.clone()) {
                        out.push(r.session_id.clone());
                    }
                }
            }
        }
        out
    }

    /// Validate against the ATIF rules, first failure wins.
    pub fn validate(&self) -> Result<(), AtifError> {
        validator::validate_trajectory(self).map_err(AtifError::Validation)
    }

    pub fn to_json(&self) -> Result<String, AtifError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, AtifError> {
        let trajectory: Trajectory = serde_json::from_str(json)?;
        trajectory.validate()?;
        Ok(trajectory)
    }
}
