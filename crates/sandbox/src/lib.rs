//! Command execution seam.
//!
//! Everything that runs an external command — docker verification, agent
//! shell actions — goes through [`CommandExecutor`]. The rest of the harness
//! treats the backend as opaque: hand it a command, get stdout/stderr and an
//! exit code back. [`LocalExecutor`] is the host-process implementation;
//! container backends implement the same trait elsewhere.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Execution failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// A command to run in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecCommand {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Wall-clock limit; `None` means no limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl ExecCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one sandboxed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed (timeout or signal)
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Opaque execute-with-stdout interface.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: ExecCommand) -> Result<ExecutionResult>;
}

/// Runs commands as host subprocesses.
#[derive(Debug, Default, Clone)]
pub struct LocalExecutor;

#[async_trait::async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, command: ExecCommand) -> Result<ExecutionResult> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        debug!(%execution_id, program = %command.program, args = ?command.args, "executing");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let start = std::time::Instant::now();
        let run = cmd.output();

        let (output, timed_out) = match command.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => (Some(output), false),
                Err(_) => (None, true),
            },
            None => (Some(run.await), false),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match output {
            Some(output) => {
                let output = output.map_err(|source| SandboxError::Spawn {
                    program: command.program.clone(),
                    source,
                })?;
                Ok(ExecutionResult {
                    execution_id,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                    duration_ms,
                    timed_out: false,
                })
            }
            None => Ok(ExecutionResult {
                execution_id,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                duration_ms,
                timed_out,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = LocalExecutor
            .execute(ExecCommand::new("echo").arg("hello"))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_success() {
        let result = LocalExecutor
            .execute(ExecCommand::new("sh").args(["-c", "exit 3"]))
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let result = LocalExecutor
            .execute(
                ExecCommand::new("sleep")
                    .arg("5")
                    .timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = LocalExecutor
            .execute(ExecCommand::new("definitely-not-a-real-binary-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }
}
