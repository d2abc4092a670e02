//! # HillClimber
//!
//! Per-task iterative configuration optimizer for Terminal-Bench. One
//! climber instance owns one task; each iteration runs the task under the
//! agent, records the result against the current configuration, asks a
//! meta-reasoner (or a heuristic fallback) for a configuration change, and
//! applies it. Configurations are fingerprinted so the store can track which
//! tuples were tried and which one performed best.

pub mod decomposer;
pub mod evaluator;
pub mod heuristic;
pub mod meta;
pub mod orchestrator;
pub mod prompt;
pub mod scoring;
pub mod store;
pub mod testgen_writer;
pub mod ttt;
pub mod types;

pub use error::HillClimberError;
pub use orchestrator::{HillClimber, IterationReport, TaskRunner};
pub use store::HillClimberStore;
pub use types::{
    ConfigChange, HillClimberConfig, HillClimberConfigInput, HillClimberRunInput, TaskRunResult,
    TerminalBenchTask, VerificationConfig,
};

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum HillClimberError {
        #[error("SQLite connection error: {0}")]
        Connection(rusqlite::Error),

        #[error("SQLite query error: {0}")]
        Query(rusqlite::Error),

        #[error("SQLite insert error: {0}")]
        Insert(rusqlite::Error),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Schema migration failed: {0}")]
        Migration(rusqlite::Error),

        #[error("Task run failed: {0}")]
        TaskRun(String),

        #[error("Verification failed: {0}")]
        Verification(String),

        #[error("Chat provider failure: {0}")]
        Provider(#[from] llm::LlmError),
    }
}

pub type Result<T> = std::result::Result<T, error::HillClimberError>;
