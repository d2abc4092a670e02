//! The training loop itself.
//!
//! Single-flight per workspace: one iteration at a time, one checkpoint
//! write per iteration, persisted before the next iteration begins. Pause
//! is cooperative and takes effect at the top of the next iteration; the
//! wall-clock and iteration budgets are checked after each iteration, so a
//! budget reached mid-iteration lets that iteration finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::episode::{Episode, SubsetReport};
use crate::error::GymError;
use crate::state::{LoopConfig, LoopState, LoopStatus, Subset};
use crate::workspace::WorkspaceLayout;

const SUITE_VERSION: &str = "terminal-bench-2";

/// Seam running every task of one subset once.
#[async_trait::async_trait]
pub trait SubsetRunner: Send + Sync {
    async fn run_subset(&self, subset: Subset, iteration: u64) -> crate::Result<SubsetReport>;
}

/// Requests a cooperative pause from another task.
#[derive(Clone)]
pub struct PauseHandle {
    flag: Arc<AtomicBool>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

pub struct TrainingLoopRunner {
    config: LoopConfig,
    workspace: WorkspaceLayout,
    runner: Arc<dyn SubsetRunner>,
    model: String,
    state: LoopState,
    pause_requested: Arc<AtomicBool>,
}

impl TrainingLoopRunner {
    /// Build a runner, restoring a persisted `running` state when
    /// `auto_resume` is set; otherwise a fresh run is started.
    pub fn new(
        config: LoopConfig,
        workspace: WorkspaceLayout,
        runner: Arc<dyn SubsetRunner>,
        model: impl Into<String>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let state = match LoopState::load(&config.state_file_path)? {
            Some(saved) if config.auto_resume && saved.status == LoopStatus::Running => {
                info!(run_id = %saved.run_id, "resuming persisted run");
                saved
            }
            _ => LoopState::new(config.start_subset),
        };

        Ok(Self {
            config,
            workspace,
            runner,
            model: model.into(),
            state,
            pause_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle {
            flag: Arc::clone(&self.pause_requested),
        }
    }

    /// Transition a paused run back to running.
    pub fn resume(&mut self) -> crate::Result<()> {
        if self.state.status == LoopStatus::Paused {
            self.pause_requested.store(false, Ordering::SeqCst);
            self.state.status = LoopStatus::Running;
            self.persist()?;
        }
        Ok(())
    }

    /// Drive the loop until a budget is exhausted, a pause is requested,
    /// or an iteration fails. Returns the terminal state.
    pub async fn run(&mut self) -> crate::Result<LoopState> {
        if matches!(self.state.status, LoopStatus::Completed | LoopStatus::Failed) {
            return Ok(self.state.clone());
        }

        let wall_clock = std::time::Instant::now();
        let budget_already_spent = self.state.total_duration_ms;

        loop {
            if self.pause_requested.swap(false, Ordering::SeqCst) {
                self.state.status = LoopStatus::Paused;
                self.persist()?;
                info!(run_id = %self.state.run_id, "paused");
                return Ok(self.state.clone());
            }

            self.run_iteration().await?;

            // Budget checks come after the iteration so a limit reached
            // mid-iteration still lets it complete.
            if self.config.max_iterations > 0
                && self.state.total_iterations >= self.config.max_iterations
            {
                info!(run_id = %self.state.run_id, "iteration budget exhausted, completing");
                self.state.status = LoopStatus::Completed;
                self.persist()?;
                return Ok(self.state.clone());
            }
            let spent = budget_already_spent + wall_clock.elapsed().as_millis() as u64;
            if self.config.max_duration_ms > 0 && spent >= self.config.max_duration_ms {
                info!(run_id = %self.state.run_id, spent, "time budget exhausted, completing");
                self.state.status = LoopStatus::Completed;
                self.persist()?;
                return Ok(self.state.clone());
            }

            if self.config.iteration_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.iteration_delay_ms,
                ))
                .await;
            }
        }
    }

    /// One iteration: run the subset, record the episode, maybe progress,
    /// persist.
    pub async fn run_iteration(&mut self) -> crate::Result<Episode> {
        self.state.status = LoopStatus::Running;
        let subset = self.state.current_subset;
        let iteration = self.state.iteration + 1;
        let started_at = Utc::now().to_rfc3339();
        let started = std::time::Instant::now();
        info!(run_id = %self.state.run_id, subset = subset.label(), iteration, "iteration start");

        let report = match self.runner.run_subset(subset, iteration).await {
            Ok(report) => report,
            Err(e) => {
                error!(run_id = %self.state.run_id, error = %e, "iteration failed");
                self.state.status = LoopStatus::Failed;
                self.state.error = Some(e.to_string());
                self.state.last_updated_at = Utc::now().to_rfc3339();
                self.persist()?;
                return Err(GymError::IterationFailed {
                    iteration: self.state.total_iterations + 1,
                    message: e.to_string(),
                });
            }
        };

        self.state.iteration += 1;
        self.state.total_iterations += 1;
        self.state.progress_mut(subset).record(report.pass_rate);
        self.state.total_duration_ms += started.elapsed().as_millis() as u64;

        let episode = Episode {
            id: format!("ep-{}", uuid::Uuid::new_v4().simple()),
            run_id: self.state.run_id.clone(),
            iteration: self.state.total_iterations,
            model: self.model.clone(),
            suite_version: SUITE_VERSION.to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            status: report.status(),
            summary: report.clone(),
            results_path: self.write_episode_results(&report)?,
        };
        self.state.last_episode_id = Some(episode.id.clone());
        telemetry::record_duration("gym.iteration", started.elapsed().as_millis() as u64);

        if self.should_progress() {
            let next = subset.next().expect("should_progress excludes the top subset");
            info!(
                run_id = %self.state.run_id,
                from = subset.label(),
                to = next.label(),
                "progression threshold met"
            );
            self.state.current_subset = next;
            self.state.iteration = 0;
        }

        self.state.last_updated_at = Utc::now().to_rfc3339();
        self.persist()?;
        Ok(episode)
    }

    /// Progression requires enough iterations in the subset, the latest
    /// pass rate over the threshold, and headroom above.
    fn should_progress(&self) -> bool {
        let progress = self.state.progress(self.state.current_subset);
        progress.iteration >= self.config.min_iterations_before_progression
            && progress.current_success_rate >= self.config.progression_threshold
            && self.state.current_subset != Subset::Tb89
    }

    fn write_episode_results(&self, report: &SubsetReport) -> crate::Result<String> {
        let dir = self.workspace.run_dir(&self.state.run_id);
        let path = dir.join(format!("episode-{}.json", self.state.total_iterations));
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, serde_json::to_string_pretty(report).unwrap_or_default())
        };
        if let Err(e) = write() {
            // Results are advisory; the checkpoint is the durable record.
            warn!(path = %path.display(), error = %e, "episode results write failed");
        }
        Ok(path.display().to_string())
    }

    fn persist(&self) -> crate::Result<()> {
        self.state.save(&self.config.state_file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::EpisodeStatus;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Runner replaying a scripted pass-rate sequence.
    struct ScriptedSubsets {
        pass_rates: Mutex<Vec<f64>>,
        fail_at: Option<usize>,
        calls: Mutex<Vec<(Subset, u64)>>,
    }

    impl ScriptedSubsets {
        fn new(pass_rates: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                pass_rates: Mutex::new(pass_rates),
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing_at(pass_rates: Vec<f64>, index: usize) -> Arc<Self> {
            Arc::new(Self {
                pass_rates: Mutex::new(pass_rates),
                fail_at: Some(index),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl SubsetRunner for ScriptedSubsets {
        async fn run_subset(&self, subset: Subset, iteration: u64) -> crate::Result<SubsetReport> {
            // Keep iterations measurably non-zero for the time-budget tests.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;

            let mut calls = self.calls.lock().unwrap();
            if self.fail_at == Some(calls.len()) {
                return Err(GymError::IterationFailed {
                    iteration,
                    message: "sandbox exploded".to_string(),
                });
            }
            calls.push((subset, iteration));

            let pass_rate = self.pass_rates.lock().unwrap().remove(0);
            let total = subset.task_count();
            let passed = (pass_rate * total as f64).round() as u32;
            Ok(SubsetReport {
                total,
                passed,
                failed: total - passed,
                timeout: 0,
                error: 0,
                pass_rate,
                avg_turns: 7.0,
                avg_tokens: 900.0,
                total_duration_ms: 5,
            })
        }
    }

    fn config(tmp: &TempDir) -> LoopConfig {
        LoopConfig {
            state_file_path: tmp.path().join(".openagents/training/loop-state.json"),
            iteration_delay_ms: 0,
            ..Default::default()
        }
    }

    fn runner(
        tmp: &TempDir,
        config: LoopConfig,
        subsets: Arc<ScriptedSubsets>,
    ) -> TrainingLoopRunner {
        TrainingLoopRunner::new(
            config,
            WorkspaceLayout::at(tmp.path().join(".openagents")),
            subsets,
            "apple-fm",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_progression_after_threshold() {
        let tmp = TempDir::new().unwrap();
        let subsets = ScriptedSubsets::new(vec![0.5, 0.6, 0.9]);
        let mut loop_runner = runner(&tmp, config(&tmp), Arc::clone(&subsets));

        for _ in 0..3 {
            loop_runner.run_iteration().await.unwrap();
        }

        // Three iterations on TB_10 with the last at 0.9 >= 0.8 promote.
        let state = loop_runner.state();
        assert_eq!(state.current_subset, Subset::Tb30);
        assert_eq!(state.iteration, 0, "per-subset counter resets");
        assert_eq!(state.total_iterations, 3);
    }

    #[tokio::test]
    async fn test_no_progression_before_min_iterations() {
        let tmp = TempDir::new().unwrap();
        let subsets = ScriptedSubsets::new(vec![1.0, 1.0]);
        let mut loop_runner = runner(&tmp, config(&tmp), subsets);

        loop_runner.run_iteration().await.unwrap();
        loop_runner.run_iteration().await.unwrap();

        // Perfect rates, but only two of the required three iterations.
        assert_eq!(loop_runner.state().current_subset, Subset::Tb10);
        assert_eq!(loop_runner.state().iteration, 2);
    }

    #[tokio::test]
    async fn test_top_subset_never_progresses() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp);
        cfg.start_subset = Subset::Tb89;
        cfg.max_iterations = 4;
        let subsets = ScriptedSubsets::new(vec![1.0, 1.0, 1.0, 1.0]);
        let mut loop_runner = runner(&tmp, cfg, subsets);

        let final_state = loop_runner.run().await.unwrap();
        assert_eq!(final_state.current_subset, Subset::Tb89);
        assert_eq!(final_state.status, LoopStatus::Completed);
    }

    #[tokio::test]
    async fn test_iteration_limit_completes_cleanly() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp);
        cfg.max_iterations = 2;
        let subsets = ScriptedSubsets::new(vec![0.1, 0.2, 0.3]);
        let mut loop_runner = runner(&tmp, cfg.clone(), subsets);

        let final_state = loop_runner.run().await.unwrap();
        assert_eq!(final_state.status, LoopStatus::Completed);
        assert_eq!(final_state.total_iterations, 2);

        // The persisted checkpoint matches the returned state.
        let persisted = LoopState::load(&cfg.state_file_path).unwrap().unwrap();
        assert_eq!(persisted, final_state);
    }

    #[tokio::test]
    async fn test_time_limit_lets_iteration_finish() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp);
        cfg.max_duration_ms = 1;
        let subsets = ScriptedSubsets::new(vec![0.5]);
        let mut loop_runner = runner(&tmp, cfg, subsets);

        let final_state = loop_runner.run().await.unwrap();
        // Clean completion, not a failure.
        assert_eq!(final_state.status, LoopStatus::Completed);
        assert_eq!(final_state.total_iterations, 1);
        assert!(final_state.error.is_none());
    }

    #[tokio::test]
    async fn test_iteration_error_marks_failed() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let subsets = ScriptedSubsets::failing_at(vec![0.5], 0);
        let mut loop_runner = runner(&tmp, cfg.clone(), subsets);

        let err = loop_runner.run().await.unwrap_err();
        assert!(matches!(err, GymError::IterationFailed { .. }));

        let persisted = LoopState::load(&cfg.state_file_path).unwrap().unwrap();
        assert_eq!(persisted.status, LoopStatus::Failed);
        assert!(persisted.error.as_deref().unwrap().contains("sandbox exploded"));
    }

    #[tokio::test]
    async fn test_pause_is_cooperative() {
        let tmp = TempDir::new().unwrap();
        let subsets = ScriptedSubsets::new(vec![0.5]);
        let mut loop_runner = runner(&tmp, config(&tmp), subsets);

        loop_runner.pause_handle().pause();
        let state = loop_runner.run().await.unwrap();
        assert_eq!(state.status, LoopStatus::Paused);
        assert_eq!(state.total_iterations, 0, "pause lands before the iteration");

        loop_runner.resume().unwrap();
        assert_eq!(loop_runner.state().status, LoopStatus::Running);
    }

    #[tokio::test]
    async fn test_auto_resume_restores_running_state() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);

        let mut persisted = LoopState::new(Subset::Tb30);
        persisted.status = LoopStatus::Running;
        persisted.total_iterations = 7;
        persisted.save(&cfg.state_file_path).unwrap();

        let restored = runner(&tmp, cfg.clone(), ScriptedSubsets::new(vec![]));
        assert_eq!(restored.state().run_id, persisted.run_id);
        assert_eq!(restored.state().current_subset, Subset::Tb30);
        assert_eq!(restored.state().total_iterations, 7);

        // A completed checkpoint starts a fresh run instead.
        let mut done = persisted.clone();
        done.status = LoopStatus::Completed;
        done.save(&cfg.state_file_path).unwrap();
        let fresh = runner(&tmp, cfg, ScriptedSubsets::new(vec![]));
        assert_ne!(fresh.state().run_id, persisted.run_id);
        assert_eq!(fresh.state().total_iterations, 0);
    }

    #[tokio::test]
    async fn test_episode_written_with_results_path() {
        let tmp = TempDir::new().unwrap();
        let subsets = ScriptedSubsets::new(vec![0.4]);
        let mut loop_runner = runner(&tmp, config(&tmp), subsets);

        let episode = loop_runner.run_iteration().await.unwrap();
        assert_eq!(episode.iteration, 1);
        assert_eq!(episode.status, EpisodeStatus::Partial);
        assert_eq!(episode.model, "apple-fm");
        assert!(std::path::Path::new(&episode.results_path).exists());
        assert_eq!(
            loop_runner.state().last_episode_id.as_deref(),
            Some(episode.id.as_str())
        );
    }
}
