//! # ATIF (Agent Trajectory Interchange Format) v1.4
//!
//! A standardized, JSON-based specification for logging the complete interaction
//! history of autonomous LLM agents: user prompts, agent turns with tool calls,
//! environment observations, and per-step token metrics.
//!
//! ## Usage
//!
//! ```rust
//! use atif::*;
//!
//! let agent = Agent::new("mechacoder", "1.0.0").with_model("apple-fm");
//! let mut trajectory = Trajectory::v1_4(session::generate_session_id(), agent);
//! trajectory.add_step(Step::user(1, "Fix the failing test"));
//! trajectory.add_step(Step::agent(2, "Looking at the test output now."));
//!
//! assert!(validator::validate_trajectory(&trajectory).is_ok());
//! ```

pub mod error;
pub mod metrics;
pub mod observation;
pub mod session;
pub mod step;
pub mod tool_call;
pub mod trajectory;
pub mod validator;

pub use error::AtifError;
pub use metrics::{FinalMetrics, Metrics};
pub use observation::{Observation, ObservationResult, SubagentTrajectoryRef};
pub use step::{Step, StepSource};
pub use tool_call::ToolCall;
pub use trajectory::{Agent, Trajectory};
pub use validator::{ValidationError, ValidationReason};

/// Schema version string carried by every valid trajectory.
pub const SCHEMA_VERSION: &str = "ATIF-v1.4";

pub type Result<T> = std::result::Result<T, AtifError>;
