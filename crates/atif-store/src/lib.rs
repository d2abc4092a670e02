//! # ATIF Store
//!
//! Filesystem storage for ATIF trajectories, laid out by date under a base
//! directory (default `.openagents/trajectories`):
//!
//! ```text
//! <base>/<YYYYMMDD>/<session>.atif.jsonl    streaming step log
//! <base>/<YYYYMMDD>/<session>.index.json    checkpoint + status (atomic)
//! <base>/<YYYYMMDD>/<session>.atif.json     full trajectory
//! ```
//!
//! The JSONL log is append-only and crash-safe: a process crash leaves at
//! worst a trailing partial line, which readers skip. The index and the full
//! trajectory files are replaced via write-to-unique-temp-then-rename so
//! consumers never observe a torn file.

pub mod error;
pub mod index;
pub mod reader;
pub mod store;
pub mod writer;

pub use error::StoreError;
pub use index::{Checkpoint, TrajectoryIndex, TrajectoryStatus};
pub use reader::read_jsonl;
pub use store::{TrajectoryMetadata, TrajectoryStore};
pub use writer::{StreamWriter, WriterPaths};

pub type Result<T> = std::result::Result<T, StoreError>;
