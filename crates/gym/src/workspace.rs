//! Per-project workspace layout, rooted at `.openagents/`.

use std::path::{Path, PathBuf};

/// Resolved locations of everything the harness persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Workspace under `project_dir/.openagents`.
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self {
            root: project_dir.as_ref().join(".openagents"),
        }
    }

    /// Workspace at an explicit root (tests, overrides).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Streamed and stored trajectories, in date folders.
    pub fn trajectories_dir(&self) -> PathBuf {
        self.root.join("trajectories")
    }

    /// Loop-runner checkpoint file.
    pub fn loop_state_path(&self) -> PathBuf {
        self.root.join("training").join("loop-state.json")
    }

    /// Shared SQLite database: skills, memory, hill-climber runs,
    /// test-gen evolution.
    pub fn database_path(&self) -> PathBuf {
        self.root.join("openagents.db")
    }

    /// Per-run episode results.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("gym").join(run_id)
    }

    /// Create every directory the layout needs.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.trajectories_dir())?;
        std::fs::create_dir_all(self.root.join("training"))?;
        std::fs::create_dir_all(self.root.join("gym"))?;
        Ok(())
    }
}
