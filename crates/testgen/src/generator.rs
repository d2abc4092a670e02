//! The iterative generation loop.
//!
//! For each category, up to `max_rounds_per_category` rounds:
//!
//! 1. *Generate* — prompt the chat provider with the task, the environment
//!    snapshot, and the category's guidance; parse a JSON array of tests and
//!    stream each new one to the sink.
//! 2. *Reflect* — show the provider what the category holds so far and ask
//!    whether coverage suffices; stream the verdict.
//!
//! A category ends when the reflector says `continue` or the round budget is
//! spent. Tests that duplicate an earlier category's (input, expected) pair
//! are dropped rather than double-counted.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use llm::{ChatMessage, ChatProvider, ChatRequest};
use serde::Deserialize;
use tracing::{debug, info};

use crate::environment::EnvironmentInfo;
use crate::error::TestGenError;
use crate::events::{EventSink, ReflectionAction, ReflectionOutcome, TestGenEvent};
use crate::scoring;
use crate::types::{GeneratedTest, TestCategory, TestGenConfigInput};

/// Final tally of one generation session.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub tests: Vec<GeneratedTest>,
    pub total_rounds: u32,
    pub category_rounds: BTreeMap<String, u32>,
    pub comprehensiveness_score: f64,
    pub total_tokens: u64,
    pub duration_ms: u64,
    pub uncertainties: Vec<String>,
}

pub struct IterativeTestGenerator {
    provider: Arc<dyn ChatProvider>,
    config: TestGenConfigInput,
    model: Option<String>,
}

impl IterativeTestGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>, config: TestGenConfigInput) -> Self {
        Self {
            provider,
            config,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Run the full loop for one task, streaming events as they happen.
    pub async fn generate(
        &self,
        task_id: &str,
        task_description: &str,
        env: &EnvironmentInfo,
        sink: EventSink<'_>,
    ) -> crate::Result<GenerationSummary> {
        let started = std::time::Instant::now();
        sink(TestGenEvent::Start {
            task_id: task_id.to_string(),
            categories: self.config.categories.clone(),
        });

        let mut tests: Vec<GeneratedTest> = Vec::new();
        let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
        let mut category_rounds: BTreeMap<String, u32> = BTreeMap::new();
        let mut total_rounds = 0u32;
        let mut total_tokens = 0u64;
        let mut uncertainties: Vec<String> = Vec::new();

        for &category in &self.config.categories {
            let mut rounds_here = 0u32;

            for round in 1..=self.config.max_rounds_per_category {
                rounds_here = round;
                total_rounds += 1;

                let prompt = build_generation_prompt(
                    task_description,
                    env,
                    category,
                    tests.iter().filter(|t| t.category == category),
                    round,
                );
                let raw = match self.ask(&prompt).await {
                    Ok((text, tokens)) => {
                        total_tokens += tokens;
                        text
                    }
                    Err(e) => {
                        sink(TestGenEvent::Error {
                            message: e.to_string(),
                        });
                        return Err(e);
                    }
                };

                let parsed = match parse_test_array(&raw, category) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        sink(TestGenEvent::Error {
                            message: e.to_string(),
                        });
                        return Err(e);
                    }
                };

                let mut added = 0u32;
                for test in parsed {
                    let key = (
                        test.input.trim().to_string(),
                        test.expected_output.as_ref().map(|s| s.trim().to_string()),
                    );
                    if !seen.insert(key) {
                        debug!(id = %test.id, "dropping duplicate test");
                        continue;
                    }
                    sink(TestGenEvent::Test { test: test.clone() });
                    tests.push(test);
                    added += 1;
                }
                sink(TestGenEvent::Progress {
                    category,
                    round,
                    tests_so_far: tests.len() as u32,
                });
                debug!(category = category.as_str(), round, added, "generation round done");

                // Reflection pass over the category so far.
                let reflection_prompt = build_reflection_prompt(
                    task_description,
                    category,
                    tests.iter().filter(|t| t.category == category),
                );
                let outcome = match self.ask(&reflection_prompt).await {
                    Ok((text, tokens)) => {
                        total_tokens += tokens;
                        match parse_reflection(&text) {
                            Some(outcome) => outcome,
                            None => {
                                uncertainties.push(format!(
                                    "unparseable reflection for {}, assuming coverage is sufficient",
                                    category.as_str()
                                ));
                                ReflectionOutcome {
                                    comprehensiveness_score: 5.0,
                                    gaps: Vec::new(),
                                    action: ReflectionAction::Continue,
                                    reflection_text: String::new(),
                                }
                            }
                        }
                    }
                    Err(e) => {
                        sink(TestGenEvent::Error {
                            message: e.to_string(),
                        });
                        return Err(e);
                    }
                };

                let action = outcome.action;
                sink(TestGenEvent::Reflection {
                    category,
                    round,
                    outcome,
                });

                if action == ReflectionAction::Continue {
                    break;
                }
            }

            category_rounds.insert(category.as_str().to_string(), rounds_here);
        }

        let comprehensiveness_score = scoring::comprehensiveness_score(
            &tests,
            env.discovered_parameter_count(),
            &self.config.weights,
        );
        let duration_ms = started.elapsed().as_millis() as u64;
        telemetry::record_duration("testgen.generate", duration_ms);
        info!(
            total_tests = tests.len(),
            total_rounds, comprehensiveness_score, "test generation complete"
        );

        sink(TestGenEvent::Complete {
            total_tests: tests.len() as u32,
            total_rounds,
            category_rounds: category_rounds.clone(),
            comprehensiveness_score,
            total_tokens_used: total_tokens,
            duration_ms,
            uncertainties: uncertainties.clone(),
        });

        Ok(GenerationSummary {
            tests,
            total_rounds,
            category_rounds,
            comprehensiveness_score,
            total_tokens,
            duration_ms,
            uncertainties,
        })
    }

    async fn ask(&self, prompt: &str) -> crate::Result<(String, u64)> {
        let mut request = ChatRequest::new(vec![
            ChatMessage::system(
                "You generate verification tests for coding tasks. \
                 Output only what is asked for, no commentary.",
            ),
            ChatMessage::user(prompt),
        ])
        .with_temperature(self.config.temperature);
        request.model = self.model.clone();

        let response = self.provider.chat(request).await?;
        let tokens = response
            .usage
            .as_ref()
            .map(|u| u.total_tokens.max(0) as u64)
            .unwrap_or(0);
        let content = response.content().unwrap_or_default().to_string();
        Ok((content, tokens))
    }
}

fn category_guidance(category: TestCategory) -> &'static str {
    match category {
        TestCategory::AntiCheat => {
            "Tests that fail if the solution hardcodes outputs or shells out to a \
             prohibited tool. Use inputs a hardcoded answer could not anticipate."
        }
        TestCategory::Existence => {
            "Tests that the expected output artifacts exist at their required paths."
        }
        TestCategory::Format => {
            "Tests that outputs have the required shape: delimiters, encodings, \
             column layout, trailing newlines."
        }
        TestCategory::HappyPath => "Straightforward representative inputs a correct solution handles.",
        TestCategory::Boundary => {
            "Inputs at the edges: empty, single element, maximum sizes, off-by-one \
             positions."
        }
        TestCategory::EdgeCase => {
            "Unusual but legal inputs: unicode, embedded separators, repeated values, \
             surprising-but-valid combinations."
        }
        TestCategory::InvalidInput => {
            "Malformed inputs the solution must reject or pass through without matching."
        }
        TestCategory::Integration => "End-to-end flows combining multiple behaviors in one input.",
        TestCategory::Correctness => "Core behavioral checks against the task statement.",
    }
}

fn build_generation_prompt<'a>(
    task_description: &str,
    env: &EnvironmentInfo,
    category: TestCategory,
    existing: impl Iterator<Item = &'a GeneratedTest>,
    round: u32,
) -> String {
    let mut prompt = format!(
        "Task:\n{task_description}\n\nEnvironment:\n{}\n",
        env.render_for_prompt()
    );
    prompt.push_str(&format!(
        "\nGenerate {} tests. {}\n",
        category.as_str(),
        category_guidance(category)
    ));

    let existing: Vec<&GeneratedTest> = existing.collect();
    if !existing.is_empty() {
        prompt.push_str(&format!(
            "\nRound {round}. Already have {} tests in this category; do not repeat them:\n",
            existing.len()
        ));
        for test in existing.iter().take(10) {
            prompt.push_str(&format!("- input: {}\n", truncate(&test.input, 80)));
        }
    }

    prompt.push_str(
        "\nRespond with a JSON array. Each element: \
         {\"id\": string, \"input\": string, \"expectedOutput\": string or null, \
         \"reasoning\": string, \"confidence\": number 0-1}. \
         expectedOutput null means the input must produce no output/match.\n",
    );
    prompt
}

fn build_reflection_prompt<'a>(
    task_description: &str,
    category: TestCategory,
    tests: impl Iterator<Item = &'a GeneratedTest>,
) -> String {
    let mut prompt = format!(
        "Task:\n{}\n\nCurrent {} tests:\n",
        truncate(task_description, 500),
        category.as_str()
    );
    for test in tests {
        prompt.push_str(&format!(
            "- {} -> {}\n",
            truncate(&test.input, 60),
            test.expected_output
                .as_deref()
                .map(|e| truncate(e, 40))
                .unwrap_or_else(|| "(no match)".to_string()),
        ));
    }
    prompt.push_str(
        "\nIs this category's coverage sufficient? Respond with JSON: \
         {\"comprehensivenessScore\": number 0-10, \"gaps\": [string], \
         \"action\": \"continue\" | \"more_tests\" | \"different_approach\", \
         \"reflectionText\": string}\n",
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct RawTest {
    #[serde(default)]
    id: Option<String>,
    input: String,
    #[serde(rename = "expectedOutput", default)]
    expected_output: Option<serde_json::Value>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse the model's JSON array of tests, tolerating prose around it.
fn parse_test_array(raw: &str, category: TestCategory) -> crate::Result<Vec<GeneratedTest>> {
    let start = raw.find('[');
    let end = raw.rfind(']');
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => {
            return Err(TestGenError::BadModelOutput(format!(
                "no JSON array in generation response: {}",
                truncate(raw, 120)
            )));
        }
    };

    let parsed: Vec<RawTest> = serde_json::from_str(&raw[start..=end])
        .map_err(|e| TestGenError::BadModelOutput(format!("test array parse failed: {e}")))?;

    Ok(parsed
        .into_iter()
        .enumerate()
        .map(|(i, t)| GeneratedTest {
            id: t
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}_{}", category.as_str(), i + 1)),
            input: t.input,
            expected_output: t.expected_output.and_then(|v| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
            reasoning: t.reasoning.unwrap_or_default(),
            category,
            confidence: t.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        })
        .collect())
}

/// Parse a reflection response, tolerating prose around the JSON object.
fn parse_reflection(raw: &str) -> Option<ReflectionOutcome> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let mut outcome: ReflectionOutcome = serde_json::from_str(&raw[start..=end]).ok()?;
    outcome.comprehensiveness_score = outcome.comprehensiveness_score.clamp(0.0, 10.0);
    Some(outcome)
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let cut: String = s.chars().take(limit).collect();
        format!("{cut}...")
    }
}
