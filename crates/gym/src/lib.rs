//! # Gym
//!
//! The training-loop runner. Drives progressive iteration across the
//! benchmark subsets (TB_10 → TB_30 → TB_89): run the current subset,
//! record an episode, persist a checkpoint, and advance to the next subset
//! once the pass rate clears the progression threshold. Every state
//! transition lands on disk before the next iteration starts, so a killed
//! process resumes exactly where it stopped.

pub mod bench;
pub mod episode;
pub mod error;
pub mod runner;
pub mod state;
pub mod workspace;

pub use bench::HillClimberSubsetRunner;
pub use episode::{Episode, EpisodeStatus, SubsetReport};
pub use error::GymError;
pub use runner::{SubsetRunner, TrainingLoopRunner};
pub use state::{LoopConfig, LoopState, LoopStatus, Subset, SubsetProgress};
pub use workspace::WorkspaceLayout;

pub type Result<T> = std::result::Result<T, GymError>;
