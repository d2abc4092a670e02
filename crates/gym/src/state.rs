//! Loop state and its atomic persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::GymError;

/// Progressive benchmark subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subset {
    #[serde(rename = "TB_10")]
    Tb10,
    #[serde(rename = "TB_30")]
    Tb30,
    #[serde(rename = "TB_89")]
    Tb89,
}

impl Subset {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tb10 => "TB_10",
            Self::Tb30 => "TB_30",
            Self::Tb89 => "TB_89",
        }
    }

    pub fn task_count(&self) -> u32 {
        match self {
            Self::Tb10 => 10,
            Self::Tb30 => 30,
            Self::Tb89 => 89,
        }
    }

    /// The next larger subset, `None` at the top.
    pub fn next(&self) -> Option<Subset> {
        match self {
            Self::Tb10 => Some(Self::Tb30),
            Self::Tb30 => Some(Self::Tb89),
            Self::Tb89 => None,
        }
    }

    pub fn parse(label: &str) -> Option<Subset> {
        match label {
            "TB_10" | "tb_10" | "tb10" => Some(Self::Tb10),
            "TB_30" | "tb_30" | "tb30" => Some(Self::Tb30),
            "TB_89" | "tb_89" | "tb89" => Some(Self::Tb89),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

/// Per-subset bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetProgress {
    /// Iterations spent in this subset since entering it
    pub iteration: u64,
    /// Pass rate of the most recent iteration
    #[serde(rename = "currentSuccessRate")]
    pub current_success_rate: f64,
    /// Mean pass rate across this subset's iterations
    #[serde(rename = "rollingSuccessRate")]
    pub rolling_success_rate: f64,
    /// Best pass rate ever seen in this subset
    #[serde(rename = "bestSuccessRate")]
    pub best_success_rate: f64,
}

impl SubsetProgress {
    pub fn record(&mut self, pass_rate: f64) {
        let n = self.iteration as f64;
        self.rolling_success_rate = (self.rolling_success_rate * n + pass_rate) / (n + 1.0);
        self.iteration += 1;
        self.current_success_rate = pass_rate;
        self.best_success_rate = self.best_success_rate.max(pass_rate);
    }
}

/// The loop-runner checkpoint, persisted after every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub status: LoopStatus,
    #[serde(rename = "currentSubset")]
    pub current_subset: Subset,
    /// Iterations in the current subset (resets on progression)
    pub iteration: u64,
    /// Iterations across the whole run
    #[serde(rename = "totalIterations")]
    pub total_iterations: u64,
    /// Keyed by subset label
    pub subsets: BTreeMap<String, SubsetProgress>,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: String,
    #[serde(rename = "totalDurationMs")]
    pub total_duration_ms: u64,
    #[serde(rename = "lastEpisodeId", skip_serializing_if = "Option::is_none")]
    pub last_episode_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoopState {
    /// Fresh state for a new run.
    pub fn new(start_subset: Subset) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4().simple()),
            status: LoopStatus::Idle,
            current_subset: start_subset,
            iteration: 0,
            total_iterations: 0,
            subsets: BTreeMap::new(),
            started_at: now.clone(),
            last_updated_at: now,
            total_duration_ms: 0,
            last_episode_id: None,
            error: None,
        }
    }

    pub fn progress_mut(&mut self, subset: Subset) -> &mut SubsetProgress {
        self.subsets.entry(subset.label().to_string()).or_default()
    }

    pub fn progress(&self, subset: Subset) -> SubsetProgress {
        self.subsets
            .get(subset.label())
            .cloned()
            .unwrap_or_default()
    }

    /// Mean pass rate across every subset touched so far.
    pub fn overall_success_rate(&self) -> f64 {
        if self.subsets.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.subsets.values().map(|p| p.rolling_success_rate).sum();
        sum / self.subsets.len() as f64
    }

    /// Write atomically via unique-temp-then-rename.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let dir = path.parent().ok_or_else(|| GymError::StateSaveFailed {
            path: path.to_path_buf(),
            message: "state path has no parent directory".to_string(),
        })?;
        std::fs::create_dir_all(dir).map_err(|e| GymError::StateSaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let json = serde_json::to_string_pretty(self).map_err(|e| GymError::StateSaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let tmp = dir.join(format!(
            "loop-state.{}.{}.tmp",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            &uuid::Uuid::new_v4().simple().to_string()[..8],
        ));
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| GymError::StateSaveFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Load a previously persisted state; `Ok(None)` when absent.
    pub fn load(path: &Path) -> crate::Result<Option<Self>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GymError::StateLoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GymError::StateLoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(rename = "startSubset")]
    pub start_subset: Subset,
    /// Cumulative wall-clock budget; 0 = unlimited
    #[serde(rename = "maxDurationMs")]
    pub max_duration_ms: u64,
    /// Iteration budget; 0 = unlimited
    #[serde(rename = "maxIterations")]
    pub max_iterations: u64,
    #[serde(rename = "iterationDelayMs")]
    pub iteration_delay_ms: u64,
    /// Pass rate required to advance to the next subset
    #[serde(rename = "progressionThreshold")]
    pub progression_threshold: f64,
    #[serde(rename = "minIterationsBeforeProgression")]
    pub min_iterations_before_progression: u64,
    #[serde(rename = "stateFilePath")]
    pub state_file_path: PathBuf,
    #[serde(rename = "autoResume")]
    pub auto_resume: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            start_subset: Subset::Tb10,
            max_duration_ms: 0,
            max_iterations: 0,
            iteration_delay_ms: 0,
            progression_threshold: 0.8,
            min_iterations_before_progression: 3,
            state_file_path: PathBuf::from(".openagents/training/loop-state.json"),
            auto_resume: true,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.progression_threshold) {
            return Err(GymError::ConfigInvalid(format!(
                "progression_threshold {} outside [0, 1]",
                self.progression_threshold
            )));
        }
        if self.min_iterations_before_progression == 0 {
            return Err(GymError::ConfigInvalid(
                "min_iterations_before_progression must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_subset_progression_chain() {
        assert_eq!(Subset::Tb10.next(), Some(Subset::Tb30));
        assert_eq!(Subset::Tb30.next(), Some(Subset::Tb89));
        assert_eq!(Subset::Tb89.next(), None);
        assert_eq!(Subset::Tb30.task_count(), 30);
    }

    #[test]
    fn test_subset_serializes_with_labels() {
        assert_eq!(serde_json::to_string(&Subset::Tb10).unwrap(), "\"TB_10\"");
        assert_eq!(Subset::parse("TB_89"), Some(Subset::Tb89));
        assert_eq!(Subset::parse("tb30"), Some(Subset::Tb30));
        assert_eq!(Subset::parse("TB_11"), None);
    }

    #[test]
    fn test_progress_recording() {
        let mut progress = SubsetProgress::default();
        progress.record(0.2);
        progress.record(0.6);
        progress.record(1.0);

        assert_eq!(progress.iteration, 3);
        assert_eq!(progress.current_success_rate, 1.0);
        assert_eq!(progress.best_success_rate, 1.0);
        assert!((progress.rolling_success_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_state_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("training").join("loop-state.json");

        let mut state = LoopState::new(Subset::Tb10);
        state.status = LoopStatus::Running;
        state.progress_mut(Subset::Tb10).record(0.5);
        state.save(&path).unwrap();

        let loaded = LoopState::load(&path).unwrap().unwrap();
        assert_eq!(loaded, state);

        // No temp residue.
        for entry in std::fs::read_dir(path.parent().unwrap()).unwrap().flatten() {
            assert!(!entry.file_name().to_string_lossy().ends_with(".tmp"));
        }
    }

    #[test]
    fn test_state_load_missing_is_none() {
        assert!(LoopState::load(Path::new("/nope/loop-state.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_state_load_corrupt_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("loop-state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LoopState::load(&path),
            Err(GymError::StateLoadFailed { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(LoopConfig::default().validate().is_ok());

        let mut bad = LoopConfig::default();
        bad.progression_threshold = 1.5;
        assert!(matches!(bad.validate(), Err(GymError::ConfigInvalid(_))));

        let mut bad = LoopConfig::default();
        bad.min_iterations_before_progression = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_overall_success_rate_averages_subsets() {
        let mut state = LoopState::new(Subset::Tb10);
        state.progress_mut(Subset::Tb10).record(0.8);
        state.progress_mut(Subset::Tb30).record(0.4);
        assert!((state.overall_success_rate() - 0.6).abs() < 1e-9);
    }
}
