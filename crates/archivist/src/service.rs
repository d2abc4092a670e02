//! The archive run itself.
//!
//! `run_archive` mines patterns with the chat provider (falling back to the
//! heuristic extractor when none is attached); `run_quick_archive` never
//! touches a model. Both promote qualifying `skill` and `optimization`
//! patterns into the skill store, link them in episodic memory, mark the
//! source trajectories archived, and optionally prune. Per-pattern failures
//! are logged and skipped; they never abort the run.

use std::sync::Arc;

use chrono::Utc;
use llm::ChatProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{ArchivistEvent, EventSink};
use crate::extractor::{heuristic_extract, model_extract};
use crate::skills::{EpisodicMemory, Skill, SkillStatus};
use crate::store::{SkillStore, TrajectoryStore};
use crate::types::{ExtractedPattern, PatternType, generate_archive_id};

/// Patterns below this confidence never become skills.
const MIN_PATTERN_CONFIDENCE: f64 = 0.6;

/// Configuration for archive runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Minimum occurrences before a pattern qualifies
    #[serde(rename = "minOccurrences")]
    pub min_occurrences: u32,
    /// Trajectories older than this are skipped and prunable
    #[serde(rename = "maxTrajectoryAgeDays")]
    pub max_trajectory_age_days: u32,
    /// Whether to prune old trajectories and stale learned skills
    #[serde(rename = "autoPrune")]
    pub auto_prune: bool,
    /// Model the full extractor asks for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            max_trajectory_age_days: 30,
            auto_prune: true,
            model: None,
        }
    }
}

/// Result of an archiving run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub id: String,
    #[serde(rename = "trajectoriesProcessed")]
    pub trajectories_processed: u32,
    #[serde(rename = "patternsExtracted")]
    pub patterns_extracted: u32,
    #[serde(rename = "skillsCreated")]
    pub skills_created: u32,
    #[serde(rename = "memoriesCreated")]
    pub memories_created: u32,
    #[serde(rename = "itemsPruned")]
    pub items_pruned: u32,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub timestamp: String,
}

pub struct Archivist {
    config: ArchiveConfig,
    skills: SkillStore,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl Archivist {
    pub fn new(config: ArchiveConfig, skills: SkillStore) -> Self {
        Self {
            config,
            skills,
            provider: None,
        }
    }

    /// Attach a chat provider for the full extractor.
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn skills(&self) -> &SkillStore {
        &self.skills
    }

    /// Full archive pass: model-backed extraction when a provider is
    /// attached, heuristic otherwise.
    pub async fn run_archive(
        &self,
        trajectories: &mut TrajectoryStore,
        sink: EventSink<'_>,
    ) -> crate::Result<ArchiveResult> {
        self.run(trajectories, sink, true).await
    }

    /// Heuristic-only pass, cheap enough to run after every episode.
    pub async fn run_quick_archive(
        &self,
        trajectories: &mut TrajectoryStore,
        sink: EventSink<'_>,
    ) -> crate::Result<ArchiveResult> {
        self.run(trajectories, sink, false).await
    }

    async fn run(
        &self,
        trajectories: &mut TrajectoryStore,
        sink: EventSink<'_>,
        use_model: bool,
    ) -> crate::Result<ArchiveResult> {
        let started = std::time::Instant::now();
        let archive_id = generate_archive_id();

        let eligible: Vec<crate::types::Trajectory> = trajectories
            .get_unarchived()
            .into_iter()
            .filter(|t| t.is_within_age(self.config.max_trajectory_age_days))
            .cloned()
            .collect();
        let eligible_refs: Vec<&crate::types::Trajectory> = eligible.iter().collect();

        sink(ArchivistEvent::RunStart {
            archive_id: archive_id.clone(),
            trajectory_count: eligible.len() as u32,
        });

        let patterns = if use_model {
            match &self.provider {
                Some(provider) => {
                    match model_extract(provider.as_ref(), self.config.model.as_deref(), &eligible_refs)
                        .await
                    {
                        Ok(patterns) => patterns,
                        Err(e) => {
                            warn!(error = %e, "model extraction failed, using heuristic");
                            heuristic_extract(&eligible_refs)
                        }
                    }
                }
                None => heuristic_extract(&eligible_refs),
            }
        } else {
            heuristic_extract(&eligible_refs)
        };

        let mut skills_created = 0u32;
        let mut memories_created = 0u32;
        let mut patterns_kept = 0u32;

        for pattern in &patterns {
            if pattern.confidence < MIN_PATTERN_CONFIDENCE
                || pattern.occurrences < self.config.min_occurrences
            {
                continue;
            }
            patterns_kept += 1;
            sink(ArchivistEvent::PatternFound {
                name: pattern.name.clone(),
                pattern_type: pattern.pattern_type,
                confidence: pattern.confidence,
            });

            if !matches!(
                pattern.pattern_type,
                PatternType::Skill | PatternType::Optimization
            ) {
                continue;
            }

            match self.promote_pattern(pattern, &eligible) {
                Ok(skill) => {
                    skills_created += 1;
                    memories_created += 1;
                    sink(ArchivistEvent::SkillPromoted {
                        skill_id: skill.id.clone(),
                        name: skill.name.clone(),
                        category: skill.category.clone(),
                    });
                }
                Err(e) => {
                    // One bad pattern must not abort the run.
                    warn!(pattern = %pattern.name, error = %e, "skill promotion failed, skipping");
                }
            }
        }

        let archived_ids: Vec<String> = eligible.iter().map(|t| t.id.clone()).collect();
        trajectories.mark_archived(&archived_ids);

        let mut items_pruned = 0u32;
        if self.config.auto_prune {
            items_pruned += trajectories.prune(self.config.max_trajectory_age_days) as u32;
            items_pruned += self.skills.prune_stale_learned()? as u32;
        }

        let result = ArchiveResult {
            id: archive_id.clone(),
            trajectories_processed: eligible.len() as u32,
            patterns_extracted: patterns_kept,
            skills_created,
            memories_created,
            items_pruned,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now().to_rfc3339(),
        };

        info!(
            archive_id = %result.id,
            trajectories = result.trajectories_processed,
            patterns = result.patterns_extracted,
            skills = result.skills_created,
            pruned = result.items_pruned,
            "archive run complete"
        );
        sink(ArchivistEvent::RunComplete {
            archive_id,
            trajectories_processed: result.trajectories_processed,
            patterns_extracted: result.patterns_extracted,
            skills_created: result.skills_created,
            items_pruned: result.items_pruned,
            duration_ms: result.duration_ms,
        });

        Ok(result)
    }

    /// Turn a qualifying pattern into a stored skill plus an episodic
    /// memory linking it back to its source episodes.
    fn promote_pattern(
        &self,
        pattern: &ExtractedPattern,
        sources: &[crate::types::Trajectory],
    ) -> crate::Result<Skill> {
        let mut skill = Skill::learned(
            pattern.name.clone(),
            pattern.description.clone(),
            pattern.content.clone(),
            pattern.category.clone(),
        );
        skill.status = SkillStatus::Active;
        skill.success_rate = pattern.success_rate;
        skill.tags = pattern.tags.clone();
        skill.learned_from = sources
            .iter()
            .filter(|t| pattern.source_trajectory_ids.contains(&t.id))
            .filter_map(|t| t.episode_id.clone())
            .collect();
        self.skills.save_skill(&skill)?;

        let memory = EpisodicMemory {
            id: crate::types::generate_memory_id(),
            episode_id: skill.learned_from.first().cloned(),
            summary: format!("Promoted '{}' from {} trajectories", skill.name, pattern.occurrences),
            skill_ids: vec![skill.id.clone()],
            created_at: Utc::now().to_rfc3339(),
        };
        self.skills.save_memory(&memory)?;

        Ok(skill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionType, TokenUsage, Trajectory, TrajectoryAction, TrajectoryOutcome};
    use llm::{ChatChoice, ChatRequest, ChatResponse, ResponseMessage};

    fn trajectory(id: &str, tool: &str, outcome: TrajectoryOutcome) -> Trajectory {
        Trajectory {
            id: id.to_string(),
            task_id: "task".to_string(),
            task_description: "Fix the failing build".to_string(),
            actions: vec![TrajectoryAction {
                action_type: ActionType::ToolCall,
                tool: Some(tool.to_string()),
                content: format!("{tool} run"),
                result: None,
                success: Some(true),
                duration_ms: Some(10),
                timestamp: Utc::now().to_rfc3339(),
            }],
            outcome,
            error_message: None,
            skills_used: vec![],
            files_modified: vec![],
            total_duration_ms: 100,
            model: "fm".to_string(),
            tokens: TokenUsage {
                input: 1,
                output: 1,
                total: 2,
            },
            timestamp: Utc::now().to_rfc3339(),
            episode_id: Some("ep-1".to_string()),
            archived: false,
        }
    }

    fn archivist() -> Archivist {
        Archivist::new(ArchiveConfig::default(), SkillStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_quick_archive_promotes_repeated_success() {
        let mut store = TrajectoryStore::new();
        store.save(trajectory("t1", "bash", TrajectoryOutcome::Success));
        store.save(trajectory("t2", "bash", TrajectoryOutcome::Success));
        store.save(trajectory("t3", "edit", TrajectoryOutcome::Failure));

        let archivist = archivist();
        let mut events = Vec::new();
        let result = archivist
            .run_quick_archive(&mut store, &mut |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(result.trajectories_processed, 3);
        assert_eq!(result.skills_created, 1);
        assert_eq!(result.memories_created, 1);

        // Source trajectories are marked archived.
        assert!(store.get_unarchived().is_empty());

        // The promoted skill is active and linked to its episode.
        let skills = archivist.skills().list_skills(Some(SkillStatus::Active)).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].learned_from, vec!["ep-1", "ep-1"]);

        // Event order: start, pattern, skill, complete.
        assert!(matches!(events[0], ArchivistEvent::RunStart { .. }));
        assert!(events.iter().any(|e| matches!(e, ArchivistEvent::PatternFound { .. })));
        assert!(events.iter().any(|e| matches!(e, ArchivistEvent::SkillPromoted { .. })));
        assert!(matches!(events.last().unwrap(), ArchivistEvent::RunComplete { .. }));
    }

    #[tokio::test]
    async fn test_low_occurrence_patterns_filtered() {
        let mut store = TrajectoryStore::new();
        store.save(trajectory("t1", "bash", TrajectoryOutcome::Success));

        let archivist = archivist();
        let result = archivist
            .run_quick_archive(&mut store, &mut |_| {})
            .await
            .unwrap();
        assert_eq!(result.patterns_extracted, 0);
        assert_eq!(result.skills_created, 0);
    }

    #[tokio::test]
    async fn test_old_trajectories_skipped_and_pruned() {
        let mut store = TrajectoryStore::new();
        let mut old = trajectory("old", "bash", TrajectoryOutcome::Success);
        old.timestamp = (Utc::now() - chrono::Duration::days(90)).to_rfc3339();
        store.save(old);
        store.save(trajectory("fresh", "bash", TrajectoryOutcome::Success));

        let archivist = archivist();
        let result = archivist
            .run_quick_archive(&mut store, &mut |_| {})
            .await
            .unwrap();

        assert_eq!(result.trajectories_processed, 1);
        assert_eq!(result.items_pruned, 1);
        assert!(store.get("old").is_none());
    }

    /// Provider whose reply is a fixed pattern list.
    struct PatternProvider;

    #[async_trait::async_trait]
    impl ChatProvider for PatternProvider {
        async fn chat(&self, _request: ChatRequest) -> llm::Result<ChatResponse> {
            let reply = r#"[
                {"name": "Check before edit", "type": "skill", "description": "read first",
                 "content": "cat file", "category": "editing", "confidence": 0.9},
                {"name": "Low confidence noise", "type": "skill", "description": "",
                 "content": "", "category": "misc", "confidence": 0.3},
                {"name": "Avoid rm -rf", "type": "antipattern", "description": "",
                 "content": "", "category": "safety", "confidence": 0.95}
            ]"#;
            Ok(ChatResponse {
                id: "p".into(),
                usage: None,
                choices: vec![ChatChoice {
                    message: ResponseMessage {
                        role: "assistant".into(),
                        content: reply.into(),
                        tool_calls: None,
                    },
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_full_archive_filters_and_promotes_model_patterns() {
        let mut store = TrajectoryStore::new();
        store.save(trajectory("t1", "bash", TrajectoryOutcome::Success));
        store.save(trajectory("t2", "bash", TrajectoryOutcome::Success));

        let archivist = Archivist::new(
            ArchiveConfig::default(),
            SkillStore::open_in_memory().unwrap(),
        )
        .with_provider(Arc::new(PatternProvider));

        let mut events = Vec::new();
        let result = archivist
            .run_archive(&mut store, &mut |e| events.push(e))
            .await
            .unwrap();

        // Low-confidence pattern dropped; antipattern found but not promoted.
        assert_eq!(result.patterns_extracted, 2);
        assert_eq!(result.skills_created, 1);

        let promoted = events
            .iter()
            .filter(|e| matches!(e, ArchivistEvent::SkillPromoted { .. }))
            .count();
        assert_eq!(promoted, 1);
    }
}
