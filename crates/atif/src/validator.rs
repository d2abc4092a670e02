//! Trajectory validation.
//!
//! Checks an in-memory [`Trajectory`] against the ATIF rules:
//!
//! 1. Step IDs start at 1 and increase by exactly 1.
//! 2. Timestamps parse as ISO 8601 and contain a literal `T` separator.
//! 3. `model_name` and `reasoning_content` appear only on agent steps.
//! 4. Every observation `source_call_id` references a `tool_call_id` from the
//!    same or an earlier step.
//! 5. The header carries the supported schema version.
//!
//! [`validate_trajectory`] stops at the first violation;
//! [`validate_trajectory_all`] collects every violation, including the
//! non-fatal `final_metrics.total_steps` mismatch that the first-fail path
//! tolerates.

use std::collections::HashSet;
use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::{SCHEMA_VERSION, Step, StepSource, Trajectory};

/// Why a trajectory failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    InvalidStepSequence,
    InvalidTimestamp,
    InvalidSource,
    OrphanToolReference,
    AgentOnlyFieldOnNonAgent,
    MissingRequiredField,
    InvalidSchemaVersion,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidStepSequence => "invalid_step_sequence",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::InvalidSource => "invalid_source",
            Self::OrphanToolReference => "orphan_tool_reference",
            Self::AgentOnlyFieldOnNonAgent => "agent_only_field_on_non_agent",
            Self::MissingRequiredField => "missing_required_field",
            Self::InvalidSchemaVersion => "invalid_schema_version",
        };
        f.write_str(s)
    }
}

/// A single validation finding, anchored to a step where applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub reason: ValidationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<i64>,
    pub details: String,
}

impl ValidationError {
    fn new(reason: ValidationReason, step_id: Option<i64>, details: impl Into<String>) -> Self {
        Self {
            reason,
            step_id,
            details: details.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_id {
            Some(id) => write!(f, "{} at step {}: {}", self.reason, id, self.details),
            None => write!(f, "{}: {}", self.reason, self.details),
        }
    }
}

/// Validate, returning the first violation found.
pub fn validate_trajectory(trajectory: &Trajectory) -> Result<(), ValidationError> {
    let mut first = None;
    run_checks(trajectory, &mut |err| {
        if first.is_none() {
            first = Some(err);
        }
        // Stop signalling once we have one.
        first.is_none()
    });
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Validate, collecting every violation.
///
/// Unlike the first-fail path, this also reports a `final_metrics.total_steps`
/// count that disagrees with the actual step count.
pub fn validate_trajectory_all(trajectory: &Trajectory) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    run_checks(trajectory, &mut |err| {
        errors.push(err);
        true
    });

    if let Some(fm) = &trajectory.final_metrics {
        if let Some(total) = fm.total_steps {
            let actual = trajectory.steps.len() as i64;
            if total != actual {
                errors.push(ValidationError::new(
                    ValidationReason::MissingRequiredField,
                    None,
                    format!("final_metrics.total_steps = {total}, actual step count = {actual}"),
                ));
            }
        }
    }

    errors
}

/// Run every check in document order, feeding violations to `sink`.
/// `sink` returns false to request an early stop.
fn run_checks(trajectory: &Trajectory, sink: &mut dyn FnMut(ValidationError) -> bool) {
    if trajectory.schema_version != SCHEMA_VERSION {
        let keep_going = sink(ValidationError::new(
            ValidationReason::InvalidSchemaVersion,
            None,
            format!(
                "expected '{}', found '{}'",
                SCHEMA_VERSION, trajectory.schema_version
            ),
        ));
        if !keep_going {
            return;
        }
    }

    if trajectory.session_id.is_empty() {
        if !sink(ValidationError::new(
            ValidationReason::MissingRequiredField,
            None,
            "session_id is empty",
        )) {
            return;
        }
    }

    let mut seen_tool_call_ids: HashSet<String> = HashSet::new();

    for (i, step) in trajectory.steps.iter().enumerate() {
        let expected_id = (i + 1) as i64;
        if step.step_id != expected_id {
            if !sink(ValidationError::new(
                ValidationReason::InvalidStepSequence,
                Some(step.step_id),
                format!(
                    "step at index {i} has step_id {}, expected {expected_id}",
                    step.step_id
                ),
            )) {
                return;
            }
        }

        if let Some(err) = check_timestamp(step) {
            if !sink(err) {
                return;
            }
        }

        if let Some(err) = check_agent_only_fields(step) {
            if !sink(err) {
                return;
            }
        }

        // Tool call IDs become referenceable from this step onward.
        if let Some(calls) = &step.tool_calls {
            for call in calls {
                seen_tool_call_ids.insert(call.tool_call_id.clone());
            }
        }

        if let Some(observation) = &step.observation {
            for result in &observation.results {
                if let Some(source_call_id) = &result.source_call_id {
                    if !seen_tool_call_ids.contains(source_call_id) {
                        if !sink(ValidationError::new(
                            ValidationReason::OrphanToolReference,
                            Some(step.step_id),
                            format!("source_call_id '{source_call_id}' matches no prior tool_call_id"),
                        )) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn check_timestamp(step: &Step) -> Option<ValidationError> {
    let Some(ts) = &step.timestamp else {
        return Some(ValidationError::new(
            ValidationReason::MissingRequiredField,
            Some(step.step_id),
            "timestamp is missing",
        ));
    };

    if !ts.contains('T') {
        return Some(ValidationError::new(
            ValidationReason::InvalidTimestamp,
            Some(step.step_id),
            format!("timestamp '{ts}' lacks a 'T' separator"),
        ));
    }

    let parses = DateTime::parse_from_rfc3339(ts).is_ok()
        || chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok();
    if !parses {
        return Some(ValidationError::new(
            ValidationReason::InvalidTimestamp,
            Some(step.step_id),
            format!("timestamp '{ts}' is not a valid ISO 8601 datetime"),
        ));
    }

    None
}

fn check_agent_only_fields(step: &Step) -> Option<ValidationError> {
    if step.source == StepSource::Agent {
        return None;
    }
    let offending = if step.model_name.is_some() {
        "model_name"
    } else if step.reasoning_content.is_some() {
        "reasoning_content"
    } else if step.tool_calls.is_some() {
        "tool_calls"
    } else if step.metrics.is_some() {
        "metrics"
    } else {
        return None;
    };
    Some(ValidationError::new(
        ValidationReason::AgentOnlyFieldOnNonAgent,
        Some(step.step_id),
        format!("{offending} set on a '{}' step", step.source.as_str()),
    ))
}
