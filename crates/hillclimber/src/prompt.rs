//! Meta-reasoner prompt construction.
//!
//! GUARDRAIL: NO TASK-SPECIFIC HARDCODING. The prompt is assembled from the
//! task description, the run result, and stored history. Nothing here may
//! encode knowledge about particular benchmark tasks or their solutions.

use crate::store::{HillClimberStore, TaskStats};
use crate::types::{HillClimberConfig, TaskRunResult};

/// Longest tried-hint excerpt shown in the history section.
const HINT_EXCERPT: usize = 50;
/// How many tried hints and recent outcomes the history section carries.
const HISTORY_LIMIT: usize = 5;

/// History context pulled from the store for one task.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    pub total_runs: i64,
    pub total_passes: i64,
    pub pass_rate: f64,
    pub best_hint: Option<String>,
    pub best_score: i64,
    pub tried_hints: Vec<String>,
    /// Most recent outcomes, newest first
    pub recent_outcomes: Vec<bool>,
}

impl RunHistory {
    /// Assemble the history section from the store.
    pub fn load(store: &HillClimberStore, task_id: &str) -> crate::Result<Self> {
        let stats = store.get_stats()?;
        let task_stats = stats.by_task.get(task_id).cloned().unwrap_or(TaskStats {
            total_runs: 0,
            pass_count: 0,
            pass_rate: 0.0,
            best_score: 0,
            best_hint: None,
        });
        let best = store.best_hint(task_id)?;
        let tried_hints = store.tried_hints(task_id, HISTORY_LIMIT)?;
        let recent_outcomes = store
            .recent_runs(task_id, HISTORY_LIMIT)?
            .iter()
            .map(|r| r.input.passed)
            .collect();

        Ok(Self {
            total_runs: task_stats.total_runs,
            total_passes: task_stats.pass_count,
            pass_rate: task_stats.pass_rate,
            best_hint: best.as_ref().and_then(|(hint, _)| hint.clone()),
            best_score: best.map(|(_, score)| score).unwrap_or(0),
            tried_hints,
            recent_outcomes,
        })
    }
}

/// Build the full meta-reasoner prompt for one completed run.
pub fn build_meta_prompt(
    task_description: &str,
    config: &HillClimberConfig,
    result: &TaskRunResult,
    history: &RunHistory,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("You tune the configuration of a coding agent attempting a task.\n\n");
    prompt.push_str(&format!("Task:\n{task_description}\n\n"));
    prompt.push_str(&format!(
        "Current hint: {}\n",
        config.hint.as_deref().unwrap_or("(none)")
    ));
    prompt.push_str(&format!(
        "Last run: {} in {} turns\n",
        if result.passed { "PASSED" } else { "FAILED" },
        result.turns
    ));
    if let Some(error) = &result.error_message {
        prompt.push_str(&format!("Error: {error}\n"));
    }
    if !result.step_summary.is_empty() {
        prompt.push_str("Recent steps:\n");
        for step in &result.step_summary {
            prompt.push_str(&format!("  - {step}\n"));
        }
    }

    prompt.push_str(&format!(
        "\nHistory: {} runs, {} passes ({:.0}% pass rate)\n",
        history.total_runs,
        history.total_passes,
        history.pass_rate * 100.0
    ));
    if let Some(best) = &history.best_hint {
        prompt.push_str(&format!(
            "Best hint so far (score {}): {}\n",
            history.best_score, best
        ));
    }
    if !history.tried_hints.is_empty() {
        prompt.push_str("Previously tried hints:\n");
        for hint in history.tried_hints.iter().take(HISTORY_LIMIT) {
            prompt.push_str(&format!("  - {}\n", excerpt(hint, HINT_EXCERPT)));
        }
    }
    if !history.recent_outcomes.is_empty() {
        let outcomes: Vec<&str> = history
            .recent_outcomes
            .iter()
            .take(HISTORY_LIMIT)
            .map(|p| if *p { "pass" } else { "fail" })
            .collect();
        prompt.push_str(&format!("Recent outcomes: {}\n", outcomes.join(", ")));
    }

    prompt.push_str(
        "\nPropose a better hint for the next attempt, or answer KEEP if the \
         current configuration should stand. Never re-propose a previously \
         tried hint that did not improve the score. Answer with the new hint \
         text alone, no explanation.\n",
    );
    prompt
}

fn excerpt(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}
