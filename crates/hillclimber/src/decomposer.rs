//! Task decomposition.
//!
//! GUARDRAIL: NO TASK-SPECIFIC HARDCODING. The decomposer must work from the
//! task description alone. Registered decompositions exist for operator-
//! supplied plans, never for baking in benchmark knowledge; the built-in
//! registry ships empty, and every unknown task gets the same generic
//! three-phase plan.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::TerminalBenchTask;

/// One phase of a decomposed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Ordinal within the decomposition, starting at 1
    pub id: u32,
    pub name: String,
    pub goal: String,
    /// Observable condition marking this phase done
    pub checkpoint: String,
    /// Files that must exist when the phase completes (suffix-matched)
    pub expected_artifacts: Vec<String>,
    pub depends_on: Vec<u32>,
    pub hints: Vec<String>,
    pub max_turns: u32,
}

impl Subtask {
    /// Phases that loop between running tests and editing accept partial
    /// progress; everything else completes only when fully done.
    fn is_test_and_iterate(&self) -> bool {
        self.name.contains("test") || self.name.contains("iterate")
    }
}

/// A task split into ordered, dependency-linked phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDecomposition {
    pub task_id: String,
    pub subtasks: Vec<Subtask>,
    pub subtask_count: usize,
    pub global_hints: Vec<String>,
    pub files_to_read: Vec<String>,
    pub required_outputs: Vec<String>,
}

/// Maps task IDs to operator-registered decompositions, falling back to a
/// generic plan.
#[derive(Default)]
pub struct Decomposer {
    registry: HashMap<String, TaskDecomposition>,
}

impl Decomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hand-written decomposition for a task.
    pub fn register(&mut self, decomposition: TaskDecomposition) {
        self.registry
            .insert(decomposition.task_id.clone(), decomposition);
    }

    pub fn decompose(&self, task: &TerminalBenchTask) -> TaskDecomposition {
        if let Some(known) = self.registry.get(&task.id) {
            return known.clone();
        }
        fallback_decomposition(task)
    }
}

/// Decompose with the default (empty) registry.
pub fn decompose_task(task: &TerminalBenchTask) -> TaskDecomposition {
    Decomposer::new().decompose(task)
}

/// The generic understand → implement → verify plan every unknown task gets.
fn fallback_decomposition(task: &TerminalBenchTask) -> TaskDecomposition {
    let output_paths = extract_output_paths(&task.description);

    let subtasks = vec![
        Subtask {
            id: 1,
            name: "understand".to_string(),
            goal: "Read the task statement and any referenced files".to_string(),
            checkpoint: "Can state what output the task requires and where it goes".to_string(),
            expected_artifacts: Vec::new(),
            depends_on: Vec::new(),
            hints: vec!["List the working directory before anything else".to_string()],
            max_turns: 5,
        },
        Subtask {
            id: 2,
            name: "implement".to_string(),
            goal: "Produce the required outputs".to_string(),
            checkpoint: "All required output files exist".to_string(),
            expected_artifacts: output_paths.clone(),
            depends_on: vec![1],
            hints: Vec::new(),
            max_turns: 15,
        },
        Subtask {
            id: 3,
            name: "verify".to_string(),
            goal: "Check the outputs against the task statement".to_string(),
            checkpoint: "Outputs match the stated requirements".to_string(),
            expected_artifacts: output_paths.clone(),
            depends_on: vec![2],
            hints: Vec::new(),
            max_turns: 10,
        },
    ];

    TaskDecomposition {
        task_id: task.id.clone(),
        subtask_count: subtasks.len(),
        subtasks,
        global_hints: Vec::new(),
        files_to_read: extract_input_paths(&task.description),
        required_outputs: output_paths,
    }
}

/// First incomplete subtask whose dependencies are all satisfied, in
/// declaration order.
pub fn current_subtask<'a>(
    decomposition: &'a TaskDecomposition,
    completed: &[u32],
) -> Option<&'a Subtask> {
    decomposition.subtasks.iter().find(|subtask| {
        !completed.contains(&subtask.id)
            && subtask.depends_on.iter().all(|dep| completed.contains(dep))
    })
}

/// Whether a subtask counts as complete given observed progress and
/// produced artifacts.
///
/// Every expected artifact must be present (suffix match). On top of that,
/// terminal subtasks need full progress; intermediate test-and-iterate
/// phases accept half.
pub fn is_subtask_complete(
    decomposition: &TaskDecomposition,
    subtask: &Subtask,
    progress: f64,
    artifacts: &[String],
) -> bool {
    let artifacts_present = subtask.expected_artifacts.iter().all(|expected| {
        artifacts
            .iter()
            .any(|produced| produced.ends_with(expected.as_str()))
    });
    if !artifacts_present {
        return false;
    }

    let is_terminal = decomposition
        .subtasks
        .last()
        .map(|last| last.id == subtask.id)
        .unwrap_or(true);

    if is_terminal {
        progress >= 1.0
    } else if subtask.is_test_and_iterate() {
        progress >= 0.5
    } else {
        progress >= 1.0
    }
}

/// Paths the task tells the agent to produce (`save ... to /app/x`,
/// `write ... to /app/y`, `output to /app/z`).
fn extract_output_paths(description: &str) -> Vec<String> {
    let lower = description.to_lowercase();
    let mut out = Vec::new();
    for marker in ["save", "write", "output"] {
        let mut rest = lower.as_str();
        while let Some(pos) = rest.find(marker) {
            rest = &rest[pos + marker.len()..];
            let Some(to_pos) = rest.find(" to ") else {
                continue;
            };
            // Only bind "to" when it sits close to the verb.
            if to_pos > 60 {
                continue;
            }
            if let Some(path) = first_path(&rest[to_pos + 4..]) {
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
    }
    out
}

/// Paths the task references as inputs.
fn extract_input_paths(description: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in description.split_whitespace() {
        if let Some(path) = first_path(word) {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}

fn first_path(s: &str) -> Option<String> {
    let start = s.find('/')?;
    let path: String = s[start..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, ',' | ';' | ')' | '"' | '\''))
        .collect();
    let path = path.trim_end_matches('.').to_string();
    (path.len() > 1 && path.contains('/')).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationConfig;

    fn task(description: &str) -> TerminalBenchTask {
        TerminalBenchTask {
            id: "some-task".to_string(),
            description: description.to_string(),
            source_path: None,
            verification: VerificationConfig::default(),
        }
    }

    #[test]
    fn test_unknown_task_gets_three_phase_fallback() {
        let decomposition = decompose_task(&task("Write a JSON validator"));
        assert_eq!(decomposition.subtask_count, 3);
        let names: Vec<&str> = decomposition.subtasks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["understand", "implement", "verify"]);
    }

    #[test]
    fn test_fallback_is_task_agnostic() {
        let a = decompose_task(&task("Write a regex parser that extracts dates"));
        let b = decompose_task(&task("Implement a JSON validator"));
        assert_eq!(a.subtask_count, b.subtask_count);
        for (sa, sb) in a.subtasks.iter().zip(b.subtasks.iter()) {
            assert_eq!(sa.name, sb.name);
        }
    }

    #[test]
    fn test_output_paths_extracted_from_description() {
        let decomposition = decompose_task(&task(
            "Read /app/input.txt and write the result to /app/output.txt",
        ));
        assert_eq!(decomposition.required_outputs, vec!["/app/output.txt"]);
        assert!(decomposition
            .files_to_read
            .contains(&"/app/input.txt".to_string()));
        assert_eq!(
            decomposition.subtasks[1].expected_artifacts,
            vec!["/app/output.txt"]
        );
    }

    #[test]
    fn test_dependencies_form_a_valid_dag() {
        let decomposition = decompose_task(&task("Process CSV files and output JSON"));
        for subtask in &decomposition.subtasks {
            assert!(!subtask.name.is_empty());
            assert!(!subtask.goal.is_empty());
            assert!(!subtask.checkpoint.is_empty());
            assert!(subtask.max_turns > 0);
            for dep in &subtask.depends_on {
                assert!(*dep < subtask.id, "dependency {dep} after subtask {}", subtask.id);
            }
        }
    }

    #[test]
    fn test_current_subtask_respects_dependencies() {
        let decomposition = decompose_task(&task("anything"));
        assert_eq!(current_subtask(&decomposition, &[]).unwrap().id, 1);
        assert_eq!(current_subtask(&decomposition, &[1]).unwrap().id, 2);
        assert_eq!(current_subtask(&decomposition, &[1, 2]).unwrap().id, 3);
        assert!(current_subtask(&decomposition, &[1, 2, 3]).is_none());
        // Phase 3 stays blocked while 2 is open even if 3 itself is pending.
        assert_eq!(current_subtask(&decomposition, &[1, 3]).unwrap().id, 2);
    }

    #[test]
    fn test_registered_decomposition_wins() {
        let mut decomposer = Decomposer::new();
        let custom = TaskDecomposition {
            task_id: "custom".to_string(),
            subtasks: vec![Subtask {
                id: 1,
                name: "only-phase".to_string(),
                goal: "do it".to_string(),
                checkpoint: "done".to_string(),
                expected_artifacts: Vec::new(),
                depends_on: Vec::new(),
                hints: Vec::new(),
                max_turns: 30,
            }],
            subtask_count: 1,
            global_hints: Vec::new(),
            files_to_read: Vec::new(),
            required_outputs: Vec::new(),
        };
        decomposer.register(custom.clone());

        let mut task = task("whatever");
        task.id = "custom".to_string();
        assert_eq!(decomposer.decompose(&task), custom);
    }

    #[test]
    fn test_subtask_completion_requires_artifacts() {
        let decomposition = decompose_task(&task("write the result to /app/out.txt"));
        let implement = &decomposition.subtasks[1];

        assert!(!is_subtask_complete(&decomposition, implement, 1.0, &[]));
        assert!(is_subtask_complete(
            &decomposition,
            implement,
            1.0,
            &["/workspace/app/out.txt".to_string()],
        ));
    }

    #[test]
    fn test_terminal_subtask_needs_full_progress() {
        let decomposition = decompose_task(&task("no outputs here"));
        let verify = decomposition.subtasks.last().unwrap();
        assert!(!is_subtask_complete(&decomposition, verify, 0.9, &[]));
        assert!(is_subtask_complete(&decomposition, verify, 1.0, &[]));
    }

    #[test]
    fn test_test_and_iterate_accepts_half_progress() {
        let mut decomposition = decompose_task(&task("x"));
        decomposition.subtasks[1].name = "test-and-iterate".to_string();
        let middle = decomposition.subtasks[1].clone();
        assert!(is_subtask_complete(&decomposition, &middle, 0.5, &[]));
        assert!(!is_subtask_complete(&decomposition, &middle, 0.4, &[]));
    }
}
