//! Streaming lifecycle events.
//!
//! The generator pushes every intermediate artifact through an [`EventSink`]
//! so callers (HUD, CLI, logs) see progress live. Sinks may buffer but must
//! not drop events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{GeneratedTest, TestCategory};

/// Reflection verdict on a category's coverage so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionAction {
    /// Coverage is sufficient, move on
    Continue,
    /// Same approach, more tests
    MoreTests,
    /// Coverage has a structural hole, change attack angle
    DifferentApproach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionOutcome {
    /// 0..=10 coverage grade from the reflector
    #[serde(rename = "comprehensivenessScore")]
    pub comprehensiveness_score: f64,
    pub gaps: Vec<String>,
    pub action: ReflectionAction,
    #[serde(rename = "reflectionText")]
    pub reflection_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestGenEvent {
    #[serde(rename = "testgen_start")]
    Start {
        task_id: String,
        categories: Vec<TestCategory>,
    },
    #[serde(rename = "testgen_test")]
    Test { test: GeneratedTest },
    #[serde(rename = "testgen_progress")]
    Progress {
        category: TestCategory,
        round: u32,
        tests_so_far: u32,
    },
    #[serde(rename = "testgen_reflection")]
    Reflection {
        category: TestCategory,
        round: u32,
        outcome: ReflectionOutcome,
    },
    #[serde(rename = "testgen_complete")]
    Complete {
        total_tests: u32,
        total_rounds: u32,
        category_rounds: BTreeMap<String, u32>,
        comprehensiveness_score: f64,
        total_tokens_used: u64,
        duration_ms: u64,
        uncertainties: Vec<String>,
    },
    #[serde(rename = "testgen_error")]
    Error { message: String },
}

/// Callback receiving each event as it happens.
pub type EventSink<'a> = &'a mut (dyn FnMut(TestGenEvent) + Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_tags() {
        let event = TestGenEvent::Start {
            task_id: "regex-log".into(),
            categories: vec![TestCategory::AntiCheat],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "testgen_start");

        let event = TestGenEvent::Error {
            message: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "testgen_error");
    }

    #[test]
    fn test_reflection_outcome_parses_camel_case() {
        let raw = r#"{
            "comprehensivenessScore": 7.5,
            "gaps": ["no unicode cases"],
            "action": "more_tests",
            "reflectionText": "needs unicode coverage"
        }"#;
        let outcome: ReflectionOutcome = serde_json::from_str(raw).unwrap();
        assert_eq!(outcome.action, ReflectionAction::MoreTests);
        assert_eq!(outcome.gaps.len(), 1);
    }
}
