//! The default subset runner: one hill-climber iteration per task, with a
//! streamed ATIF trajectory captured for every attempt and a quick archive
//! pass mining the batch afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use atif::{Agent, Step, session};
use atif_store::{StreamWriter, TrajectoryStatus};
use chrono::Utc;
use hillclimber::{HillClimber, HillClimberStore, TerminalBenchTask};
use tracing::{info, warn};

use crate::episode::SubsetReport;
use crate::error::GymError;
use crate::runner::SubsetRunner;
use crate::state::Subset;
use crate::workspace::WorkspaceLayout;

/// Runs the benchmark through the hill-climber stack.
///
/// Tasks are held in canonical benchmark order; a subset takes the matching
/// prefix. Each task gets one run-propose-apply iteration per subset pass,
/// so hints keep evolving while the loop climbs subsets.
pub struct HillClimberSubsetRunner {
    tasks: Vec<TerminalBenchTask>,
    agent: Arc<dyn hillclimber::TaskRunner>,
    agent_name: String,
    model: String,
    db_path: PathBuf,
    trajectories_dir: PathBuf,
    archive: bool,
}

impl HillClimberSubsetRunner {
    pub fn new(
        workspace: &WorkspaceLayout,
        tasks: Vec<TerminalBenchTask>,
        agent: Arc<dyn hillclimber::TaskRunner>,
        agent_name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            agent,
            agent_name: agent_name.into(),
            model: model.into(),
            db_path: workspace.database_path(),
            trajectories_dir: workspace.trajectories_dir(),
            archive: true,
        }
    }

    /// Disable the post-pass quick archive.
    pub fn without_archive(mut self) -> Self {
        self.archive = false;
        self
    }

    /// Stream a minimal trajectory for one attempt.
    async fn capture_trajectory(
        &self,
        task: &TerminalBenchTask,
        report: &hillclimber::IterationReport,
    ) -> atif_store::Result<String> {
        let session_id = session::generate_session_id();
        let agent = Agent::new(&self.agent_name, env!("CARGO_PKG_VERSION")).with_model(&self.model);
        let writer = StreamWriter::new(&self.trajectories_dir, &session_id, agent, None);

        writer.initialize().await?;
        writer.write_step(&Step::user(1, &task.description)).await?;
        let mut summary = format!(
            "{} in {} turns",
            if report.result.passed { "Passed" } else { "Failed" },
            report.result.turns
        );
        if let Some(error) = &report.result.error_message {
            summary.push_str(&format!(": {error}"));
        }
        writer
            .write_step(&Step::agent(2, summary).with_model(&self.model))
            .await?;

        let status = if report.result.passed {
            TrajectoryStatus::Complete
        } else {
            TrajectoryStatus::Failed
        };
        writer.close(None, status).await?;
        Ok(session_id)
    }

    /// Convert an iteration into the archivist's trajectory record.
    fn archivist_record(
        &self,
        task: &TerminalBenchTask,
        report: &hillclimber::IterationReport,
    ) -> archivist::Trajectory {
        archivist::Trajectory {
            id: archivist::types::generate_trajectory_id(),
            task_id: task.id.clone(),
            task_description: task.description.clone(),
            actions: report
                .result
                .step_summary
                .iter()
                .map(|step| archivist::TrajectoryAction {
                    action_type: archivist::ActionType::ToolCall,
                    tool: None,
                    content: step.clone(),
                    result: None,
                    success: Some(report.result.passed),
                    duration_ms: None,
                    timestamp: Utc::now().to_rfc3339(),
                })
                .collect(),
            outcome: if report.result.passed {
                archivist::TrajectoryOutcome::Success
            } else {
                archivist::TrajectoryOutcome::Failure
            },
            error_message: report.result.error_message.clone(),
            skills_used: Vec::new(),
            files_modified: Vec::new(),
            total_duration_ms: 0,
            model: self.model.clone(),
            tokens: archivist::TokenUsage {
                input: 0,
                output: 0,
                total: 0,
            },
            timestamp: Utc::now().to_rfc3339(),
            episode_id: None,
            archived: false,
        }
    }
}

#[async_trait::async_trait]
impl SubsetRunner for HillClimberSubsetRunner {
    async fn run_subset(&self, subset: Subset, iteration: u64) -> crate::Result<SubsetReport> {
        let count = (subset.task_count() as usize).min(self.tasks.len());
        let started = std::time::Instant::now();

        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut errored = 0u32;
        let mut total_turns = 0u64;
        let mut archive_batch = archivist::TrajectoryStore::new();

        for task in &self.tasks[..count] {
            let store =
                HillClimberStore::open(&self.db_path).map_err(|e| GymError::IterationFailed {
                    iteration,
                    message: e.to_string(),
                })?;
            let climber = HillClimber::new(task.clone(), store, Arc::clone(&self.agent));

            match climber.iterate().await {
                Ok(report) => {
                    if report.result.passed {
                        passed += 1;
                    } else {
                        failed += 1;
                    }
                    total_turns += report.result.turns as u64;

                    if let Err(e) = self.capture_trajectory(task, &report).await {
                        warn!(task_id = %task.id, error = %e, "trajectory capture failed");
                    }
                    archive_batch.save(self.archivist_record(task, &report));
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "task iteration errored");
                    errored += 1;
                }
            }
        }

        if self.archive && archive_batch.count() > 0 {
            let skills = archivist::SkillStore::open(&self.db_path).map_err(|e| {
                GymError::IterationFailed {
                    iteration,
                    message: e.to_string(),
                }
            })?;
            let archivist =
                archivist::Archivist::new(archivist::ArchiveConfig::default(), skills);
            if let Err(e) = archivist
                .run_quick_archive(&mut archive_batch, &mut |_| {})
                .await
            {
                warn!(error = %e, "quick archive failed");
            }
        }

        let total = count as u32;
        let completed = passed + failed;
        info!(
            subset = subset.label(),
            iteration, passed, failed, errored, "subset pass complete"
        );

        Ok(SubsetReport {
            total,
            passed,
            failed,
            timeout: 0,
            error: errored,
            pass_rate: if total > 0 {
                passed as f64 / total as f64
            } else {
                0.0
            },
            avg_turns: if completed > 0 {
                total_turns as f64 / completed as f64
            } else {
                0.0
            },
            avg_tokens: 0.0,
            total_duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
