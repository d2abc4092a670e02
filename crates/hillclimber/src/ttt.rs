//! Test-Time Training loop.
//!
//! For a single target task with labelled training examples, generate waves
//! of candidate solutions, validate each against the training set, and pick
//! the final prediction by weighted majority vote. Training accuracy is the
//! only quality signal; the target output is never consulted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// A labelled training pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: Value,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TttConfig {
    pub max_iterations: u32,
    pub attempts_per_iteration: u32,
    /// Training accuracy at which the loop stops early
    pub satisfaction_threshold: f64,
    /// Minimum accuracy gain between iterations to keep going
    pub min_improvement_threshold: f64,
    /// Whether failed attempts with partial accuracy become hindsight pairs
    pub hindsight_enabled: bool,
}

impl Default for TttConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            attempts_per_iteration: 50,
            satisfaction_threshold: 1.0,
            min_improvement_threshold: 0.01,
            hindsight_enabled: true,
        }
    }
}

/// Per-example validation detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResult {
    pub example_index: usize,
    pub passed: bool,
}

/// Validation outcome for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accuracy: f64,
    pub examples_tested: usize,
    pub examples_passed: usize,
    pub example_results: Vec<ExampleResult>,
}

/// One scored candidate solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAttempt {
    pub output: Value,
    pub training_accuracy: f64,
    pub success: bool,
}

/// A task–solution pair synthesized from a partially-correct failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HindsightPair {
    pub output: Value,
    pub training_accuracy: f64,
    pub iteration: u32,
}

/// Final verdict of the voting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingResult {
    pub output: Value,
    pub confidence: f64,
    pub winner_weight: f64,
    pub total_weight: f64,
    pub group_count: usize,
}

/// Outcome of the whole loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TttOutcome {
    pub prediction: Option<VotingResult>,
    pub best_accuracy: f64,
    pub iterations_run: u32,
    pub attempts_scored: usize,
    pub hindsight_pairs: Vec<HindsightPair>,
}

/// Validate one attempt's output against the training examples.
///
/// `solve` applies the attempt to one training input; equality is deep and
/// key-order-insensitive.
pub fn validate_attempt(
    examples: &[TrainingExample],
    mut solve: impl FnMut(&Value) -> Value,
) -> ValidationResult {
    let mut example_results = Vec::with_capacity(examples.len());
    let mut passed = 0usize;
    for (i, example) in examples.iter().enumerate() {
        let produced = solve(&example.input);
        let ok = outputs_equal(&produced, &example.output);
        if ok {
            passed += 1;
        }
        example_results.push(ExampleResult {
            example_index: i,
            passed: ok,
        });
    }
    ValidationResult {
        accuracy: if examples.is_empty() {
            0.0
        } else {
            passed as f64 / examples.len() as f64
        },
        examples_tested: examples.len(),
        examples_passed: passed,
        example_results,
    }
}

/// Run the iterate-and-vote loop.
///
/// `generate(iteration)` produces candidate outputs; `score` returns each
/// candidate's training validation. Terminates early on satisfaction or a
/// plateau (< `min_improvement_threshold` gain between iterations).
pub fn run_ttt(
    config: &TttConfig,
    mut generate: impl FnMut(u32) -> Vec<Value>,
    mut score: impl FnMut(&Value) -> ValidationResult,
) -> TttOutcome {
    let mut attempts: Vec<ScoredAttempt> = Vec::new();
    let mut hindsight_pairs: Vec<HindsightPair> = Vec::new();
    let mut best_accuracy = 0.0f64;
    let mut previous_best = 0.0f64;
    let mut iterations_run = 0u32;

    for iteration in 1..=config.max_iterations {
        iterations_run = iteration;

        let candidates = generate(iteration);
        let wave: Vec<Value> = candidates
            .into_iter()
            .take(config.attempts_per_iteration as usize)
            .collect();
        debug!(iteration, wave = wave.len(), "scoring attempt wave");

        for output in wave {
            let validation = score(&output);
            let success = validation.accuracy >= config.satisfaction_threshold;
            if config.hindsight_enabled && !success && validation.accuracy > 0.0 {
                hindsight_pairs.push(HindsightPair {
                    output: output.clone(),
                    training_accuracy: validation.accuracy,
                    iteration,
                });
            }
            best_accuracy = best_accuracy.max(validation.accuracy);
            attempts.push(ScoredAttempt {
                output,
                training_accuracy: validation.accuracy,
                success,
            });
        }

        if best_accuracy >= config.satisfaction_threshold {
            info!(iteration, best_accuracy, "satisfaction threshold reached");
            break;
        }
        if iteration > 1 && best_accuracy - previous_best < config.min_improvement_threshold {
            info!(iteration, best_accuracy, "plateau, stopping early");
            break;
        }
        previous_best = best_accuracy;
    }

    TttOutcome {
        prediction: weighted_majority_vote(&attempts),
        best_accuracy,
        iterations_run,
        attempts_scored: attempts.len(),
        hindsight_pairs,
    }
}

/// Weighted majority vote over attempts.
///
/// Attempts are grouped by canonical output; each contributes
/// `1 + 1000 × training_accuracy` to its group. The heaviest group wins and
/// confidence is its share of the total weight.
pub fn weighted_majority_vote(attempts: &[ScoredAttempt]) -> Option<VotingResult> {
    if attempts.is_empty() {
        return None;
    }

    let mut groups: Vec<(String, Value, f64)> = Vec::new();
    let mut total_weight = 0.0f64;
    for attempt in attempts {
        let key = canonical_json(&attempt.output);
        let weight = 1.0 + 1000.0 * attempt.training_accuracy;
        total_weight += weight;
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, group_weight)) => *group_weight += weight,
            None => groups.push((key, attempt.output.clone(), weight)),
        }
    }

    let group_count = groups.len();
    let (_, output, winner_weight) = groups
        .into_iter()
        .max_by(|a, b| a.2.total_cmp(&b.2))?;

    Some(VotingResult {
        output,
        confidence: winner_weight / total_weight,
        winner_weight,
        total_weight,
        group_count,
    })
}

/// Deep structural equality with object keys sorted.
pub fn outputs_equal(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}

/// Canonical rendering: objects re-serialized with sorted keys at every
/// level, so logically equal outputs compare equal.
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), canonicalize(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}
