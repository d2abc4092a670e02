use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GymError {
    #[error("Invalid loop configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to load state from {}: {message}", .path.display())]
    StateLoadFailed { path: PathBuf, message: String },

    #[error("Failed to save state to {}: {message}", .path.display())]
    StateSaveFailed { path: PathBuf, message: String },

    #[error("Iteration {iteration} failed: {message}")]
    IterationFailed { iteration: u64, message: String },

    #[error("Wall-clock budget of {0} ms exhausted")]
    TimeLimitExceeded(u64),

    #[error("Iteration budget of {0} exhausted")]
    IterationLimitExceeded(u64),
}
