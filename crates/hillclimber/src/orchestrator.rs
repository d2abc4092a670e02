//! The run-propose-apply cycle.
//!
//! GUARDRAIL: NO TASK-SPECIFIC HARDCODING. The orchestrator only ever sees
//! the task description, the stored history, and the injected seams. Any
//! knowledge about how to solve a task must be discovered by the agent or
//! proposed by the meta-reasoner, never baked in here.

use std::sync::Arc;

use tracing::{info, warn};

use crate::heuristic::heuristic_propose;
use crate::meta::MetaReasoner;
use crate::prompt::RunHistory;
use crate::scoring::score_result;
use crate::store::HillClimberStore;
use crate::types::{
    ConfigChange, HillClimberConfig, HillClimberRunInput, TaskRunResult, TerminalBenchTask,
};

/// Seam executing the task under the agent with a given configuration.
#[async_trait::async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        task: &TerminalBenchTask,
        config: &HillClimberConfig,
    ) -> crate::Result<TaskRunResult>;
}

/// What one iteration did, for callers and logs.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub run_number: i64,
    pub config_id: i64,
    pub result: TaskRunResult,
    pub score: i64,
    pub change: ConfigChange,
    pub change_accepted: bool,
    pub meta_model: Option<String>,
}

/// One climber instance per task.
pub struct HillClimber {
    task: TerminalBenchTask,
    store: HillClimberStore,
    runner: Arc<dyn TaskRunner>,
    meta: Option<MetaReasoner>,
}

impl HillClimber {
    pub fn new(task: TerminalBenchTask, store: HillClimberStore, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            task,
            store,
            runner,
            meta: None,
        }
    }

    /// Attach a meta-reasoner; without one, every proposal is heuristic.
    pub fn with_meta(mut self, meta: MetaReasoner) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn store(&self) -> &HillClimberStore {
        &self.store
    }

    /// Run one full iteration: execute, record, propose, apply.
    pub async fn iterate(&self) -> crate::Result<IterationReport> {
        let config = self.store.ensure_default_config(&self.task.id)?;
        let run_number = self.store.run_count(&self.task.id)? + 1;
        info!(task_id = %self.task.id, run_number, config_id = config.id, "iteration start");

        let started = std::time::Instant::now();
        let result = self.runner.run(&self.task, &config).await?;
        let duration_ms = started.elapsed().as_millis() as u64;
        let score = score_result(result.passed, result.turns);

        let (change, meta_model) = self.propose(run_number, &config, &result).await;

        // Apply the proposal; `Keep` hashes to the same config row.
        let next_input = change.apply(&config.as_input());
        let change_accepted = !matches!(change, ConfigChange::Keep { .. });
        let next_config = self.store.save_config(&next_input)?;

        let run_input = HillClimberRunInput {
            run_id: format!("hc-{}-{}", self.task.id, uuid::Uuid::new_v4().simple()),
            task_id: self.task.id.clone(),
            config_id: config.id,
            passed: result.passed,
            turns: result.turns,
            duration_ms,
            step_summary: (!result.step_summary.is_empty()).then(|| result.step_summary.clone()),
            error_message: result.error_message.clone(),
            meta_model: meta_model.clone(),
            proposed_change: serde_json::to_string(&change).ok(),
            change_accepted,
            score,
        };
        let saved = self.store.save_run(&run_input)?;
        telemetry::increment("hillclimber.iterations", 1);
        info!(
            task_id = %self.task.id,
            run_number = saved.run_number,
            passed = result.passed,
            score,
            next_config = next_config.id,
            "iteration complete"
        );

        Ok(IterationReport {
            run_number: saved.run_number,
            config_id: config.id,
            result,
            score,
            change,
            change_accepted,
            meta_model,
        })
    }

    /// Meta-reasoner when available, heuristic fallback otherwise (or when
    /// the meta call fails).
    async fn propose(
        &self,
        run_number: i64,
        config: &HillClimberConfig,
        result: &TaskRunResult,
    ) -> (ConfigChange, Option<String>) {
        if let Some(meta) = &self.meta {
            let history = match RunHistory::load(&self.store, &self.task.id) {
                Ok(history) => history,
                Err(e) => {
                    warn!(error = %e, "history load failed, using empty history");
                    RunHistory::default()
                }
            };
            match meta
                .propose(run_number, &self.task.description, config, result, &history)
                .await
            {
                Ok((change, model)) => return (change, Some(model)),
                Err(e) => {
                    warn!(error = %e, "meta proposal failed, falling back to heuristic");
                }
            }
        }
        (heuristic_propose(&self.task.id, config, result), None)
    }
}
