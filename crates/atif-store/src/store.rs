//! Full-trajectory file store.
//!
//! Persists validator-clean trajectories as `<base>/<YYYYMMDD>/<session>.atif.json`
//! and resolves parent/child links across sessions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use atif::{Trajectory, session, validator};
use chrono::Utc;
use tracing::debug;

use crate::error::StoreError;

/// Summary of a stored trajectory without its steps.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMetadata {
    pub session_id: String,
    pub parent_session_id: Option<String>,
    pub child_session_ids: Vec<String>,
    pub agent_name: String,
    pub model_name: Option<String>,
    pub step_count: usize,
    pub total_cost_usd: Option<f64>,
    pub created_at: Option<String>,
}

/// Filesystem store for complete trajectories.
///
/// Lookups go through a lazily-populated path cache; on a miss the store
/// probes the date folder implied by the session ID, then scans every date
/// folder.
pub struct TrajectoryStore {
    base_dir: PathBuf,
    validate_on_save: bool,
    path_cache: Mutex<HashMap<String, PathBuf>>,
}

impl TrajectoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            validate_on_save: true,
            path_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Skip validation on save; used by tools that persist partial captures.
    pub fn without_validation(mut self) -> Self {
        self.validate_on_save = false;
        self
    }

    /// Persist a trajectory via write-temp-then-rename.
    pub fn save(&self, trajectory: &Trajectory) -> crate::Result<PathBuf> {
        if self.validate_on_save {
            validator::validate_trajectory(trajectory).map_err(StoreError::ValidationFailed)?;
        }

        let path = self.expected_path(&trajectory.session_id);
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
        std::fs::create_dir_all(dir).map_err(|e| StoreError::write(dir, e))?;

        let json = serde_json::to_string_pretty(trajectory)
            .map_err(|e| StoreError::parse(&path, e))?;
        let tmp = dir.join(format!(
            "{}.{}.{}.tmp",
            trajectory.session_id,
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            &uuid::Uuid::new_v4().simple().to_string()[..8],
        ));
        std::fs::write(&tmp, json).map_err(|e| StoreError::write(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::write(&path, e))?;

        self.path_cache
            .lock()
            .unwrap()
            .insert(trajectory.session_id.clone(), path.clone());
        debug!(session_id = %trajectory.session_id, path = %path.display(), "saved trajectory");
        Ok(path)
    }

    /// Load a trajectory by session ID.
    pub fn load(&self, session_id: &str) -> crate::Result<Trajectory> {
        let path = self.resolve_path(session_id)?;
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(session_id.to_string())
            } else {
                StoreError::write(&path, e)
            }
        })?;
        serde_json::from_str(&raw).map_err(|e| StoreError::parse(&path, e))
    }

    /// List every stored session ID, newest date folder first.
    pub fn list(&self) -> crate::Result<Vec<String>> {
        let mut dates = self.date_folders()?;
        dates.sort();
        dates.reverse();

        let mut out = Vec::new();
        for date in dates {
            out.extend(self.list_for_date(&date)?);
        }
        Ok(out)
    }

    /// List session IDs stored under one `YYYYMMDD` folder.
    pub fn list_for_date(&self, date: &str) -> crate::Result<Vec<String>> {
        let dir = self.base_dir.join(date);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::write(&dir, e)),
        };

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(session_id) = name.strip_suffix(".atif.json") {
                out.push(session_id.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Extract metadata without exposing steps: parent, children discovered
    /// through subagent refs, and total cost.
    pub fn metadata(&self, session_id: &str) -> crate::Result<TrajectoryMetadata> {
        let trajectory = self.load(session_id)?;
        Ok(Self::metadata_of(&trajectory))
    }

    fn metadata_of(trajectory: &Trajectory) -> TrajectoryMetadata {
        let total_cost_usd = trajectory
            .final_metrics
            .as_ref()
            .and_then(|m| m.total_cost_usd)
            .or_else(|| {
                let costs: Vec<f64> = trajectory
                    .steps
                    .iter()
                    .filter_map(|s| s.metrics.as_ref().and_then(|m| m.cost_usd))
                    .collect();
                (!costs.is_empty()).then(|| costs.iter().sum())
            });

        TrajectoryMetadata {
            session_id: trajectory.session_id.clone(),
            parent_session_id: trajectory.parent_session_id.clone(),
            child_session_ids: trajectory.child_session_ids(),
            agent_name: trajectory.agent.name.clone(),
            model_name: trajectory.agent.model_name.clone(),
            step_count: trajectory.steps.len(),
            total_cost_usd,
            created_at: trajectory.created_at.clone(),
        }
    }

    /// Session IDs whose header names `parent_session_id` as parent.
    pub fn find_children(&self, parent_session_id: &str) -> crate::Result<Vec<String>> {
        let mut out = Vec::new();
        for session_id in self.list()? {
            if let Ok(t) = self.load(&session_id) {
                if t.parent_session_id.as_deref() == Some(parent_session_id) {
                    out.push(session_id);
                }
            }
        }
        Ok(out)
    }

    /// Load a session and all transitively referenced subagent sessions,
    /// breadth-first. Cycles are bugs upstream but must not hang traversal,
    /// so visited IDs are never re-enqueued; unresolvable refs are skipped.
    pub fn get_tree(&self, session_id: &str) -> crate::Result<Vec<Trajectory>> {
        let root = self.load(session_id)?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.session_id.clone());
        let mut queue: VecDeque<String> = root.child_session_ids().into();
        let mut out = vec![root];

        while let Some(next) = queue.pop_front() {
            if !visited.insert(next.clone()) {
                continue;
            }
            match self.load(&next) {
                Ok(t) => {
                    queue.extend(t.child_session_ids());
                    out.push(t);
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(session_id = %next, "subagent ref not present in store");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }

    /// Session IDs recorded by agents whose name contains `agent_name`.
    pub fn find_by_agent(&self, agent_name: &str) -> crate::Result<Vec<String>> {
        let mut out = Vec::new();
        for session_id in self.list()? {
            if let Ok(t) = self.load(&session_id) {
                if t.agent.name.contains(agent_name) {
                    out.push(session_id);
                }
            }
        }
        Ok(out)
    }

    /// Delete a stored trajectory.
    pub fn delete(&self, session_id: &str) -> crate::Result<()> {
        let path = self.resolve_path(session_id)?;
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(session_id.to_string())
            } else {
                StoreError::write(&path, e)
            }
        })?;
        self.path_cache.lock().unwrap().remove(session_id);
        Ok(())
    }

    fn expected_path(&self, session_id: &str) -> PathBuf {
        let folder =
            session::date_folder_for_session(session_id).unwrap_or_else(session::today_folder);
        self.base_dir
            .join(folder)
            .join(format!("{session_id}.atif.json"))
    }

    /// Cache hit, then the expected date folder, then a scan of every
    /// date folder.
    fn resolve_path(&self, session_id: &str) -> crate::Result<PathBuf> {
        if let Some(path) = self.path_cache.lock().unwrap().get(session_id) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let expected = self.expected_path(session_id);
        if expected.exists() {
            self.path_cache
                .lock()
                .unwrap()
                .insert(session_id.to_string(), expected.clone());
            return Ok(expected);
        }

        for date in self.date_folders()? {
            let candidate = self
                .base_dir
                .join(&date)
                .join(format!("{session_id}.atif.json"));
            if candidate.exists() {
                self.path_cache
                    .lock()
                    .unwrap()
                    .insert(session_id.to_string(), candidate.clone());
                return Ok(candidate);
            }
        }

        Err(StoreError::NotFound(session_id.to_string()))
    }

    fn date_folders(&self) -> crate::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::write(&self.base_dir, e)),
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() == 8 && name.chars().all(|c| c.is_ascii_digit()) {
                out.push(name);
            }
        }
        Ok(out)
    }
}
