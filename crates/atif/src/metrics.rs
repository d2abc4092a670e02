use serde::{Deserialize, Serialize};
use serde_json::Value;

/// LLM operational data for a single agent step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    /// Prompt tokens consumed by this step's inference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<i64>,

    /// Completion tokens produced by this step's inference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<i64>,

    /// Prompt tokens served from cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<i64>,

    /// Monetary cost of this step in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(prompt: i64, completion: i64) -> Self {
        Self {
            prompt_tokens: Some(prompt),
            completion_tokens: Some(completion),
            cached_tokens: None,
            cost_usd: None,
        }
    }
}

/// Summary metrics for the entire trajectory.
///
/// All fields are optional as this entire object is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinalMetrics {
    /// Sum of all prompt tokens across all steps in the trajectory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_prompt_tokens: Option<i64>,

    /// Sum of all completion tokens across all steps in the trajectory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_completion_tokens: Option<i64>,

    /// Sum of all cached tokens across all steps in the trajectory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cached_tokens: Option<i64>,

    /// Total real monetary cost for the entire trajectory in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    /// Total number of steps
    ///
    /// Can be unequal to length of steps array if explained in notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<i64>,

    /// Custom aggregate metrics not covered by the core schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl FinalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum step metrics into a final summary.
    pub fn from_steps(steps: &[crate::Step]) -> Self {
        let mut prompt = 0i64;
        let mut completion = 0i64;
        let mut cached = 0i64;
        let mut cost = 0f64;
        let mut saw_cost = false;

        for step in steps {
            if let Some(m) = &step.metrics {
                prompt += m.prompt_tokens.unwrap_or(0);
                completion += m.completion_tokens.unwrap_or(0);
                cached += m.cached_tokens.unwrap_or(0);
                if let Some(c) = m.cost_usd {
                    cost += c;
                    saw_cost = true;
                }
            }
        }

        Self {
            total_prompt_tokens: Some(prompt),
            total_completion_tokens: Some(completion),
            total_cached_tokens: Some(cached),
            total_cost_usd: saw_cost.then_some(cost),
            total_steps: Some(steps.len() as i64),
            extra: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Step;

    #[test]
    fn test_from_steps_sums_token_counts() {
        let steps = vec![
            Step::user(1, "go"),
            Step::agent(2, "ok").with_metrics(Metrics {
                prompt_tokens: Some(100),
                completion_tokens: Some(40),
                cached_tokens: Some(25),
                cost_usd: Some(0.002),
            }),
            Step::agent(3, "done").with_metrics(Metrics::with_tokens(60, 10)),
        ];

        let fm = FinalMetrics::from_steps(&steps);
        assert_eq!(fm.total_prompt_tokens, Some(160));
        assert_eq!(fm.total_completion_tokens, Some(50));
        assert_eq!(fm.total_cached_tokens, Some(25));
        assert_eq!(fm.total_cost_usd, Some(0.002));
        assert_eq!(fm.total_steps, Some(3));
    }

    #[test]
    fn test_from_steps_without_costs() {
        let steps = vec![Step::user(1, "hello")];
        let fm = FinalMetrics::from_steps(&steps);
        assert_eq!(fm.total_cost_usd, None);
        assert_eq!(fm.total_steps, Some(1));
    }
}
