//! Heuristic configuration fallback.
//!
//! When no meta-reasoner is reachable, propose changes from fixed rules:
//! seed an empty hint from the per-task table, trim verbosity on slow
//! passes, and patch in targeted guidance for recognizable error
//! signatures.

use crate::types::{ConfigChange, HillClimberConfig, TaskRunResult};

/// Turn count past which a passing run is considered wasteful.
const SLOW_PASS_TURNS: u32 = 20;

/// Starting hints for tasks whose shape is known up front.
pub fn seed_hint(task_id: &str) -> Option<&'static str> {
    match task_id {
        "regex-log" => Some(
            "Write the regex directly to /app/regex.txt. The regex should match dates in YYYY-MM-DD format.",
        ),
        "csv-to-json" => Some(
            "Parse the CSV header first, then emit one JSON object per row to /app/output.json.",
        ),
        "broken-symlinks" => Some(
            "Use find -xtype l to locate broken symlinks before touching anything.",
        ),
        _ => None,
    }
}

/// Propose a change without consulting any model.
pub fn heuristic_propose(
    task_id: &str,
    config: &HillClimberConfig,
    result: &TaskRunResult,
) -> ConfigChange {
    let current = config.hint.as_deref().unwrap_or("");

    // An empty hint gets the seed before anything else.
    if current.is_empty() {
        if let Some(seed) = seed_hint(task_id) {
            return ConfigChange::UpdateHint {
                new_hint: seed.to_string(),
                reasoning: "seeding empty hint from the task table".to_string(),
            };
        }
    }

    if result.passed && result.turns > SLOW_PASS_TURNS {
        return ConfigChange::UpdateHint {
            new_hint: append_phrase(current, "Be direct and efficient."),
            reasoning: format!("passed but took {} turns", result.turns),
        };
    }

    if let Some(error) = &result.error_message {
        let lower = error.to_lowercase();
        let patch = if lower.contains("file not found") {
            Some("Check that file paths exist before reading them.")
        } else if lower.contains("permission denied") {
            Some("Work under /app where you have write access.")
        } else if lower.contains("syntax error") {
            Some("Re-read the file after writing it to confirm the syntax is valid.")
        } else {
            None
        };
        if let Some(patch) = patch {
            if !current.contains(patch) {
                return ConfigChange::UpdateHint {
                    new_hint: append_phrase(current, patch),
                    reasoning: format!("error signature: {}", excerpt(error, 60)),
                };
            }
        }
    }

    ConfigChange::Keep {
        reasoning: "no heuristic applies".to_string(),
    }
}

fn append_phrase(current: &str, phrase: &str) -> String {
    if current.is_empty() {
        phrase.to_string()
    } else {
        format!("{current} {phrase}")
    }
}

fn excerpt(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}
