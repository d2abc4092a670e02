//! Skills, reflections, and the episodic memory record.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where a skill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    /// Shipped with the harness
    Bootstrap,
    /// Promoted from extracted patterns
    Learned,
    /// Hand-written by an operator
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Draft,
    Active,
    Retired,
}

/// A reusable procedure with usage bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    /// The code snippet or approach text
    pub content: String,
    pub category: String,
    pub source: SkillSource,
    #[serde(rename = "usageCount")]
    pub usage_count: u32,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    pub status: SkillStatus,
    pub tags: Vec<String>,
    /// Episode IDs this skill was learned from
    #[serde(rename = "learnedFrom")]
    pub learned_from: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Skill {
    pub fn learned(
        name: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::types::generate_skill_id(),
            name: name.into(),
            description: description.into(),
            content: content.into(),
            category: category.into(),
            source: SkillSource::Learned,
            usage_count: 0,
            success_rate: 0.0,
            status: SkillStatus::Draft,
            tags: Vec::new(),
            learned_from: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Why a task attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Timeout,
    Error,
    WrongOutput,
    Other,
}

/// A post-failure written lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: String,
    #[serde(rename = "episodeId")]
    pub episode_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "failureType")]
    pub failure_type: FailureType,
    pub description: String,
    pub lesson: String,
    #[serde(rename = "suggestedApproach")]
    pub suggested_approach: String,
    #[serde(rename = "relatedSkills")]
    pub related_skills: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// A remembered episode, linking promoted skills back to their origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    pub id: String,
    #[serde(rename = "episodeId", skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    pub summary: String,
    #[serde(rename = "skillIds")]
    pub skill_ids: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learned_skill_defaults() {
        let skill = Skill::learned("retry loop", "retry flaky commands", "for i in 1 2 3; do", "shell");
        assert_eq!(skill.source, SkillSource::Learned);
        assert_eq!(skill.status, SkillStatus::Draft);
        assert_eq!(skill.usage_count, 0);
        assert!(skill.id.starts_with("skill-"));
    }

    #[test]
    fn test_failure_type_serialization() {
        assert_eq!(
            serde_json::to_string(&FailureType::WrongOutput).unwrap(),
            "\"wrong_output\""
        );
        assert_eq!(
            serde_json::to_string(&SkillSource::Bootstrap).unwrap(),
            "\"bootstrap\""
        );
    }
}
