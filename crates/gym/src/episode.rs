//! Episode records: the outcome of one pass through a subset.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Success,
    Partial,
    Failure,
}

/// Aggregate results of running every task in a subset once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetReport {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub timeout: u32,
    pub error: u32,
    #[serde(rename = "passRate")]
    pub pass_rate: f64,
    #[serde(rename = "avgTurns")]
    pub avg_turns: f64,
    #[serde(rename = "avgTokens")]
    pub avg_tokens: f64,
    #[serde(rename = "totalDurationMs")]
    pub total_duration_ms: u64,
}

impl SubsetReport {
    /// Status classification: all passed, some passed, none passed.
    pub fn status(&self) -> EpisodeStatus {
        if self.total > 0 && self.passed == self.total {
            EpisodeStatus::Success
        } else if self.passed > 0 {
            EpisodeStatus::Partial
        } else {
            EpisodeStatus::Failure
        }
    }
}

/// One recorded pass of the agent across a subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    /// 1-based iteration within the run
    pub iteration: u64,
    pub model: String,
    #[serde(rename = "suiteVersion")]
    pub suite_version: String,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    pub status: EpisodeStatus,
    pub summary: SubsetReport,
    /// Where the full per-task results were written
    #[serde(rename = "resultsPath")]
    pub results_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(total: u32, passed: u32) -> SubsetReport {
        SubsetReport {
            total,
            passed,
            failed: total - passed,
            timeout: 0,
            error: 0,
            pass_rate: if total == 0 { 0.0 } else { passed as f64 / total as f64 },
            avg_turns: 8.0,
            avg_tokens: 1200.0,
            total_duration_ms: 60_000,
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(report(10, 10).status(), EpisodeStatus::Success);
        assert_eq!(report(10, 4).status(), EpisodeStatus::Partial);
        assert_eq!(report(10, 0).status(), EpisodeStatus::Failure);
        assert_eq!(report(0, 0).status(), EpisodeStatus::Failure);
    }

    #[test]
    fn test_episode_wire_format() {
        let episode = Episode {
            id: "ep-1".into(),
            run_id: "run-1".into(),
            iteration: 3,
            model: "apple-fm".into(),
            suite_version: "tb-2".into(),
            started_at: "2025-01-01T00:00:00Z".into(),
            finished_at: "2025-01-01T00:10:00Z".into(),
            status: EpisodeStatus::Partial,
            summary: report(10, 4),
            results_path: ".openagents/gym/run-1/episode-3.json".into(),
        };
        let json = serde_json::to_value(&episode).unwrap();
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["summary"]["passRate"], 0.4);
    }
}
