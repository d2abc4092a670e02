//! Solution verification.
//!
//! Parses pytest output (and our own compact verification summary) into
//! counts, and runs the generated suite inside a docker container against a
//! candidate workspace.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use sandbox::{CommandExecutor, ExecCommand, LocalExecutor};
use tracing::{debug, info};

use crate::error::HillClimberError;
use crate::types::TerminalBenchTask;

/// A single failing test extracted from the output.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFailure {
    pub test_name: String,
    pub message: String,
}

/// Parsed counts from a verification run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub failures: Vec<TestFailure>,
}

/// Parse pytest output into counts.
///
/// Handles the standard summary lines (`5 passed in 0.12s`,
/// `4 failed, 6 passed in 0.15s`), the `FAILED path::test - msg` short
/// summary entries, and our own `Verification: FAILED (8/12 tests)` format.
/// Unrecognized output parses to zeros rather than an error.
pub fn parse_pytest_output(output: &str) -> ParseResult {
    let mut result = ParseResult::default();

    // Our own compact format takes priority when present.
    let ours = Regex::new(r"Verification:\s+(?:PASSED|FAILED)\s+\((\d+)/(\d+) tests\)")
        .expect("static regex");
    if let Some(caps) = ours.captures(output) {
        result.passed = caps[1].parse().unwrap_or(0);
        result.total = caps[2].parse().unwrap_or(0);
        result.failed = result.total.saturating_sub(result.passed);
        result.failures = collect_failures(output);
        return result;
    }

    let passed_re = Regex::new(r"(\d+) passed").expect("static regex");
    let failed_re = Regex::new(r"(\d+) failed").expect("static regex");
    if let Some(caps) = passed_re.captures(output) {
        result.passed = caps[1].parse().unwrap_or(0);
    }
    if let Some(caps) = failed_re.captures(output) {
        result.failed = caps[1].parse().unwrap_or(0);
    }
    result.total = result.passed + result.failed;
    result.failures = collect_failures(output);
    result
}

/// `FAILED <path>::<test>[ - message]` short-summary lines.
fn collect_failures(output: &str) -> Vec<TestFailure> {
    let mut failures = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("FAILED ") else {
            continue;
        };
        let (test_name, message) = match rest.split_once(" - ") {
            Some((name, message)) => (name.trim(), message.trim()),
            None => (rest.trim(), ""),
        };
        failures.push(TestFailure {
            test_name: test_name.to_string(),
            message: message.to_string(),
        });
    }
    failures
}

/// Render counts back into the compact format the meta prompt consumes.
pub fn format_for_prompt(result: &ParseResult) -> String {
    let verdict = if result.failed == 0 && result.total > 0 {
        "PASSED"
    } else {
        "FAILED"
    };
    let mut out = format!(
        "Verification: {verdict} ({}/{} tests)",
        result.passed, result.total
    );
    for failure in result.failures.iter().take(2) {
        out.push_str(&format!("\n  - {}: {}", failure.test_name, failure.message));
    }
    if result.failures.len() > 2 {
        out.push_str(&format!(
            "\n  ... and {} more failures",
            result.failures.len() - 2
        ));
    }
    out
}

/// Outcome of a docker verification run.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub passed: bool,
    pub tests_passing: u32,
    pub tests_total: u32,
    pub duration_ms: u64,
    pub output: String,
}

/// Whether a docker daemon answers on this machine.
pub async fn is_docker_available() -> bool {
    LocalExecutor
        .execute(
            ExecCommand::new("docker")
                .arg("info")
                .timeout(Duration::from_secs(10)),
        )
        .await
        .map(|r| r.success())
        .unwrap_or(false)
}

/// Run pytest over `workspace` inside the task's verification image.
///
/// The workspace is mounted read-write at `/workspace`; tests live in the
/// task's configured tests directory.
pub async fn run_docker_verification(
    task: &TerminalBenchTask,
    workspace: &Path,
    timeout_secs: u64,
) -> crate::Result<EvalResult> {
    let mount = format!("{}:/workspace", workspace.display());
    let tests_dir = &task.verification.tests_dir;

    debug!(task_id = %task.id, image = %task.verification.docker_image, "docker verification");
    let result = LocalExecutor
        .execute(
            ExecCommand::new("docker")
                .args([
                    "run",
                    "--rm",
                    "-v",
                    &mount,
                    "-w",
                    "/workspace",
                    &task.verification.docker_image,
                    "python",
                    "-m",
                    "pytest",
                    tests_dir,
                    "-v",
                ])
                .timeout(Duration::from_secs(timeout_secs)),
        )
        .await
        .map_err(|e| HillClimberError::Verification(e.to_string()))?;

    if result.timed_out {
        return Err(HillClimberError::Verification(format!(
            "verification timed out after {timeout_secs}s"
        )));
    }

    let output = format!("{}\n{}", result.stdout, result.stderr);
    let parsed = parse_pytest_output(&output);
    info!(
        task_id = %task.id,
        passed = parsed.failed == 0 && parsed.total > 0,
        tests = parsed.total,
        "verification complete"
    );

    Ok(EvalResult {
        passed: parsed.failed == 0 && parsed.total > 0,
        tests_passing: parsed.passed,
        tests_total: parsed.total,
        duration_ms: result.duration_ms,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_passing() {
        let output = "collected 5 items\n\ntests/test_solution.py .....  [100%]\n\n===== 5 passed in 0.12s =====\n";
        let result = parse_pytest_output(output);
        assert_eq!(result.total, 5);
        assert_eq!(result.passed, 5);
        assert_eq!(result.failed, 0);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_parse_mixed_results_with_failures() {
        let output = r#"
collected 10 items

tests/test_solution.py ...F.F..FF  [100%]

=========================== short test summary info ============================
FAILED tests/test_solution.py::test_four
FAILED tests/test_solution.py::test_six
FAILED tests/test_solution.py::test_nine - AssertionError
FAILED tests/test_solution.py::test_ten
============================== 4 failed, 6 passed in 0.15s =====================
"#;
        let result = parse_pytest_output(output);
        assert_eq!(result.total, 10);
        assert_eq!(result.passed, 6);
        assert_eq!(result.failed, 4);
        assert_eq!(result.failures.len(), 4);
        assert_eq!(result.failures[2].message, "AssertionError");
    }

    #[test]
    fn test_verbose_failure_counted_once() {
        let output = r#"
tests/test_solution.py::test_basic PASSED
tests/test_solution.py::test_edge FAILED - AssertionError: lists differ

=========================== short test summary info ============================
FAILED tests/test_solution.py::test_edge - AssertionError
============================== 1 failed, 1 passed in 0.03s =====================
"#;
        let result = parse_pytest_output(output);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].test_name.contains("test_edge"));
    }

    #[test]
    fn test_parse_own_summary_format() {
        let output = "\nVerification: FAILED (8/12 tests)\n  - test_basic: expected ['x'], got []\n";
        let result = parse_pytest_output(output);
        assert_eq!(result.passed, 8);
        assert_eq!(result.total, 12);
        assert_eq!(result.failed, 4);
    }

    #[test]
    fn test_parse_empty_and_error_outputs() {
        assert_eq!(parse_pytest_output("").total, 0);

        let error = "ERROR collecting tests/test_solution.py\nModuleNotFoundError: No module named 'solution'\n";
        let result = parse_pytest_output(error);
        assert_eq!(result.total, 0);
        assert_eq!(result.passed, 0);
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let result = ParseResult {
            total: 12,
            passed: 8,
            failed: 4,
            failures: vec![
                TestFailure {
                    test_name: "test_a".into(),
                    message: "wrong".into(),
                },
                TestFailure {
                    test_name: "test_b".into(),
                    message: "also wrong".into(),
                },
                TestFailure {
                    test_name: "test_c".into(),
                    message: "very wrong".into(),
                },
            ],
        };
        let formatted = format_for_prompt(&result);
        assert!(formatted.contains("FAILED (8/12 tests)"));
        assert!(formatted.contains("and 1 more"));

        let reparsed = parse_pytest_output(&formatted);
        assert_eq!(reparsed.passed, 8);
        assert_eq!(reparsed.total, 12);
        assert_eq!(reparsed.failed, 4);
    }
}
