//! Archivist - Trajectory Analysis and Pattern Extraction
//!
//! The Archivist subagent reviews trajectories and extracts reusable
//! patterns into the skill/memory library.
//!
//! It runs periodically (or on-demand) to:
//! 1. Review completed task trajectories
//! 2. Identify successful patterns worth preserving
//! 3. Promote repeated solutions to skills
//! 4. Build episodic memories from lessons learned
//! 5. Prune low-value or outdated entries

pub mod error;
pub mod events;
pub mod extractor;
pub mod service;
pub mod skills;
pub mod store;
pub mod types;

pub use error::ArchivistError;
pub use events::ArchivistEvent;
pub use service::{ArchiveConfig, ArchiveResult, Archivist};
pub use skills::{FailureType, Reflection, Skill, SkillSource, SkillStatus};
pub use store::{SkillStore, TrajectoryStore};
pub use types::{
    ActionType, ExtractedPattern, PatternType, TokenUsage, Trajectory, TrajectoryAction,
    TrajectoryOutcome,
};

pub type Result<T> = std::result::Result<T, ArchivistError>;
