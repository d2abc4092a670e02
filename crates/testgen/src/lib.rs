//! # TestGen
//!
//! Environment-aware, iterative test synthesis for Terminal-Bench tasks.
//!
//! The generator never sees the benchmark's reference tests. It reads the
//! task description and an introspected snapshot of the working environment,
//! then walks an ordered list of test categories; inside each category it
//! alternates generation rounds with a reflection pass until the reflector
//! is satisfied or the round budget runs out. Every test and reflection is
//! streamed to the caller as an event, and each run's configuration and
//! outcome lands in a SQLite evolution store for meta-learning.

pub mod environment;
pub mod error;
pub mod events;
pub mod generator;
pub mod scoring;
pub mod store;
pub mod types;

pub use environment::EnvironmentInfo;
pub use error::TestGenError;
pub use events::{EventSink, TestGenEvent};
pub use generator::{GenerationSummary, IterativeTestGenerator};
pub use store::TestGenStore;
pub use types::{GeneratedTest, TestCategory, TestGenConfig, TestGenConfigInput, TestGenRunInput};

pub type Result<T> = std::result::Result<T, TestGenError>;
