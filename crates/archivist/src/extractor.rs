//! Pattern extraction.
//!
//! Two extractors share one output shape: the full extractor asks the chat
//! provider to mine patterns from trajectory summaries; the heuristic
//! extractor groups trajectories by first tool and outcome and promotes
//! repeated successful groups without any model in the loop.

use std::collections::HashMap;

use chrono::Utc;
use llm::{ChatMessage, ChatProvider, ChatRequest};
use serde::Deserialize;
use tracing::debug;

use crate::types::{
    ActionType, ExtractedPattern, PatternType, Trajectory, TrajectoryOutcome, generate_pattern_id,
};

/// Fraction of successful outcomes across a set of trajectories.
pub fn calculate_success_rate(trajectories: &[&Trajectory]) -> f64 {
    if trajectories.is_empty() {
        return 0.0;
    }
    let successful = trajectories
        .iter()
        .filter(|t| t.outcome == TrajectoryOutcome::Success)
        .count();
    successful as f64 / trajectories.len() as f64
}

/// Group trajectories by first tool + outcome, the crude similarity key.
pub fn group_similar<'a>(trajectories: &[&'a Trajectory]) -> HashMap<String, Vec<&'a Trajectory>> {
    let mut groups: HashMap<String, Vec<&Trajectory>> = HashMap::new();
    for t in trajectories {
        let outcome = match t.outcome {
            TrajectoryOutcome::Success => "success",
            TrajectoryOutcome::Failure => "failure",
            TrajectoryOutcome::Partial => "partial",
            TrajectoryOutcome::Timeout => "timeout",
        };
        let key = format!("{}-{}", t.first_tool(), outcome);
        groups.entry(key).or_default().push(t);
    }
    groups
}

/// Model-free extraction: each repeated successful group becomes a skill
/// pattern whose confidence grows with its size.
pub fn heuristic_extract(trajectories: &[&Trajectory]) -> Vec<ExtractedPattern> {
    let mut patterns = Vec::new();
    for (key, group) in group_similar(trajectories) {
        if !key.ends_with("-success") || group.len() < 2 {
            continue;
        }
        let tool = group[0].first_tool().to_string();
        let ids: Vec<String> = group.iter().map(|t| t.id.clone()).collect();
        let sample_action = group[0]
            .actions
            .iter()
            .find(|a| a.action_type == ActionType::ToolCall)
            .map(|a| a.content.clone())
            .unwrap_or_default();

        patterns.push(ExtractedPattern {
            id: generate_pattern_id("skill"),
            pattern_type: PatternType::Skill,
            name: format!("{tool} first approach"),
            description: format!(
                "Starting with {tool} led to success across {} attempts",
                group.len()
            ),
            content: sample_action,
            trigger_context: vec![group[0].task_description.clone()],
            success_rate: 1.0,
            occurrences: group.len() as u32,
            source_trajectory_ids: ids,
            confidence: (0.5 + 0.1 * group.len() as f64).min(0.9),
            category: "tooling".to_string(),
            tags: vec![tool],
            extracted_at: Utc::now().to_rfc3339(),
        });
    }
    patterns
}

/// Build the extraction prompt from trajectory summaries.
pub fn build_pattern_extraction_prompt(trajectories: &[&Trajectory]) -> String {
    let successful: Vec<&&Trajectory> = trajectories
        .iter()
        .filter(|t| t.outcome == TrajectoryOutcome::Success)
        .collect();
    let failed: Vec<&&Trajectory> = trajectories
        .iter()
        .filter(|t| t.outcome == TrajectoryOutcome::Failure)
        .collect();

    let mut parts = vec![
        "You are an Archivist analyzing task trajectories to extract reusable patterns."
            .to_string(),
        String::new(),
        "## Successful Trajectories".to_string(),
        String::new(),
    ];

    for t in successful.iter().take(5) {
        parts.push(format!("### Task: {}", t.task_description));
        let skills = if t.skills_used.is_empty() {
            "none".to_string()
        } else {
            t.skills_used.join(", ")
        };
        parts.push(format!("Duration: {}ms, Skills: {}", t.total_duration_ms, skills));
        parts.push("Actions:".to_string());
        for action in t.actions.iter().take(10) {
            if action.action_type == ActionType::ToolCall {
                let tool = action.tool.as_deref().unwrap_or("unknown");
                let preview = if action.content.len() > 100 {
                    format!("{}...", &action.content[..100])
                } else {
                    action.content.clone()
                };
                parts.push(format!("  - {tool}: {preview}"));
            }
        }
        parts.push(String::new());
    }

    if !failed.is_empty() {
        parts.push("## Failed Trajectories (antipatterns to avoid)".to_string());
        parts.push(String::new());
        for t in failed.iter().take(3) {
            parts.push(format!("### Task: {}", t.task_description));
            let error = t
                .error_message
                .as_deref()
                .map(|e| {
                    if e.len() > 200 {
                        format!("{}...", &e[..200])
                    } else {
                        e.to_string()
                    }
                })
                .unwrap_or_else(|| "unknown".to_string());
            parts.push(format!("Error: {error}"));
            parts.push(String::new());
        }
    }

    parts.extend([
        "## Extract Patterns".to_string(),
        String::new(),
        "Identify reusable patterns from these trajectories. For each pattern, provide:"
            .to_string(),
        "1. **name**: Short descriptive name".to_string(),
        "2. **type**: skill | convention | antipattern | optimization".to_string(),
        "3. **description**: What the pattern does".to_string(),
        "4. **content**: The code/approach to use".to_string(),
        "5. **triggerContext**: When to use this pattern".to_string(),
        "6. **category**: Category for organization".to_string(),
        "7. **confidence**: 0-1".to_string(),
        String::new(),
        "Output as a JSON array of patterns.".to_string(),
    ]);

    parts.join("\n")
}

/// Ask the chat provider to extract patterns.
pub async fn model_extract(
    provider: &dyn ChatProvider,
    model: Option<&str>,
    trajectories: &[&Trajectory],
) -> crate::Result<Vec<ExtractedPattern>> {
    let prompt = build_pattern_extraction_prompt(trajectories);
    let mut request = ChatRequest::new(vec![ChatMessage::user(prompt)]).with_temperature(0.3);
    request.model = model.map(String::from);

    let response = provider.chat(request).await?;
    let raw = response.content().unwrap_or_default();
    let ids: Vec<String> = trajectories.iter().map(|t| t.id.clone()).collect();
    let patterns = parse_patterns_from_response(raw, ids);
    debug!(count = patterns.len(), "model extraction produced patterns");
    Ok(patterns)
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    name: Option<String>,
    #[serde(rename = "type")]
    pattern_type: Option<String>,
    description: Option<String>,
    content: Option<String>,
    #[serde(rename = "triggerContext")]
    trigger_context: Option<Vec<String>>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    confidence: Option<f64>,
}

/// Parse patterns from a model response; non-JSON responses parse to
/// nothing rather than an error.
pub fn parse_patterns_from_response(
    response: &str,
    source_trajectory_ids: Vec<String>,
) -> Vec<ExtractedPattern> {
    let json_start = response.find('[');
    let json_end = response.rfind(']');
    let (json_start, json_end) = match (json_start, json_end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => return Vec::new(),
    };

    let parsed: Vec<RawPattern> = match serde_json::from_str(&response[json_start..=json_end]) {
        Ok(p) => p,
        Err(_) => return Vec::new(),
    };

    parsed
        .into_iter()
        .map(|p| {
            let pattern_type_str = p.pattern_type.as_deref().unwrap_or("skill");
            let pattern_type = match pattern_type_str {
                "convention" => PatternType::Convention,
                "antipattern" => PatternType::Antipattern,
                "optimization" => PatternType::Optimization,
                _ => PatternType::Skill,
            };
            ExtractedPattern {
                id: generate_pattern_id(pattern_type_str),
                pattern_type,
                name: p.name.unwrap_or_else(|| "Unnamed Pattern".to_string()),
                description: p.description.unwrap_or_default(),
                content: p.content.unwrap_or_default(),
                trigger_context: p.trigger_context.unwrap_or_default(),
                success_rate: 1.0,
                occurrences: source_trajectory_ids.len() as u32,
                source_trajectory_ids: source_trajectory_ids.clone(),
                confidence: p.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
                category: p.category.unwrap_or_else(|| "general".to_string()),
                tags: p.tags.unwrap_or_default(),
                extracted_at: Utc::now().to_rfc3339(),
            }
        })
        .collect()
}
