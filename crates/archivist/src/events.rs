//! HUD lifecycle events emitted during archive runs.

use serde::{Deserialize, Serialize};

use crate::types::PatternType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchivistEvent {
    #[serde(rename = "archivist_run_start")]
    RunStart {
        archive_id: String,
        trajectory_count: u32,
    },
    #[serde(rename = "archivist_pattern_found")]
    PatternFound {
        name: String,
        pattern_type: PatternType,
        confidence: f64,
    },
    #[serde(rename = "archivist_skill_promoted")]
    SkillPromoted {
        skill_id: String,
        name: String,
        category: String,
    },
    #[serde(rename = "archivist_run_complete")]
    RunComplete {
        archive_id: String,
        trajectories_processed: u32,
        patterns_extracted: u32,
        skills_created: u32,
        items_pruned: u32,
        duration_ms: u64,
    },
}

/// Callback receiving each event as it happens.
pub type EventSink<'a> = &'a mut (dyn FnMut(ArchivistEvent) + Send);
