//! `hillclimber` — drive the run-propose-apply loop for one task.
//!
//! The agent-under-test is supplied as a shell command; exit code zero
//! counts as a pass. This keeps the binary agnostic about which agent
//! (FM worker, Claude, anything scriptable) is climbing.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hillclimber::{
    HillClimber, HillClimberConfig, HillClimberStore, TaskRunResult, TaskRunner, TerminalBenchTask,
    VerificationConfig,
};
use sandbox::{CommandExecutor, ExecCommand, LocalExecutor};

#[derive(Parser)]
#[command(name = "hillclimber", about = "Per-task configuration optimizer")]
struct Cli {
    /// SQLite database path
    #[arg(long, default_value = ".openagents/openagents.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run N iterations of the loop for a task
    Run {
        /// Task identifier
        #[arg(long)]
        task: String,
        /// File holding the task description
        #[arg(long)]
        description_file: PathBuf,
        /// Shell command that attempts the task; exit 0 means pass.
        /// The current hint is exported as HILLCLIMBER_HINT.
        #[arg(long)]
        agent_command: String,
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    /// Print per-task statistics
    Stats,
    /// Print the most recent runs for a task
    History {
        #[arg(long)]
        task: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Runs the configured shell command once per iteration.
struct ShellAgentRunner {
    command: String,
}

#[async_trait::async_trait]
impl TaskRunner for ShellAgentRunner {
    async fn run(
        &self,
        _task: &TerminalBenchTask,
        config: &HillClimberConfig,
    ) -> hillclimber::Result<TaskRunResult> {
        let mut exec = ExecCommand::new("sh").args(["-c", self.command.as_str()]);
        if let Some(hint) = &config.hint {
            exec.env.push(("HILLCLIMBER_HINT".to_string(), hint.clone()));
        }

        let result = LocalExecutor
            .execute(exec)
            .await
            .map_err(|e| hillclimber::HillClimberError::TaskRun(e.to_string()))?;

        let mut tail: Vec<String> = result.stdout.lines().rev().take(3).map(String::from).collect();
        tail.reverse();
        let mut run = TaskRunResult::new(result.success(), 1).with_step_summary(tail);
        if !result.success() {
            run = run.with_error(result.stderr.lines().last().unwrap_or("non-zero exit").to_string());
        }
        Ok(run)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Some(parent) = cli.db.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = HillClimberStore::open(&cli.db).context("open hillclimber store")?;

    match cli.command {
        Command::Run {
            task,
            description_file,
            agent_command,
            runs,
        } => {
            let description = std::fs::read_to_string(&description_file)
                .with_context(|| format!("read {}", description_file.display()))?;
            let task = TerminalBenchTask {
                id: task,
                description,
                source_path: Some(description_file),
                verification: VerificationConfig::default(),
            };
            let climber = HillClimber::new(
                task,
                store,
                Arc::new(ShellAgentRunner {
                    command: agent_command,
                }),
            );

            for _ in 0..runs {
                let report = climber.iterate().await?;
                println!(
                    "run {}: {} (score {}), change: {}",
                    report.run_number,
                    if report.result.passed { "PASS" } else { "FAIL" },
                    report.score,
                    report.change.reasoning(),
                );
            }
        }
        Command::Stats => {
            let stats = store.get_stats()?;
            println!("total runs: {}", stats.total_runs);
            let mut tasks: Vec<_> = stats.by_task.iter().collect();
            tasks.sort_by_key(|(id, _)| id.as_str());
            for (task_id, task_stats) in tasks {
                println!(
                    "{task_id}: {} runs, {:.0}% pass, best {}",
                    task_stats.total_runs,
                    task_stats.pass_rate * 100.0,
                    task_stats.best_score,
                );
            }
        }
        Command::History { task, limit } => {
            for run in store.recent_runs(&task, limit)? {
                println!(
                    "#{} {} turns={} score={} {}",
                    run.run_number,
                    if run.input.passed { "PASS" } else { "FAIL" },
                    run.input.turns,
                    run.input.score,
                    run.input.error_message.as_deref().unwrap_or(""),
                );
            }
        }
    }

    Ok(())
}
