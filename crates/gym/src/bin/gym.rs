//! `gym` — run the progressive training loop.
//!
//! The benchmark harness itself is supplied as a shell command that runs
//! one subset pass and prints a JSON `SubsetReport` on stdout. The loop
//! runner owns state, progression, and checkpointing around it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gym::{
    GymError, LoopConfig, LoopState, Subset, SubsetReport, SubsetRunner, TrainingLoopRunner,
    WorkspaceLayout,
};
use sandbox::{CommandExecutor, ExecCommand, LocalExecutor};

#[derive(Parser)]
#[command(name = "gym", about = "Progressive Terminal-Bench training loop")]
struct Cli {
    /// Workspace root (defaults to ./.openagents)
    #[arg(long, default_value = ".openagents")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the training loop
    Run {
        /// Model name recorded on episodes
        #[arg(long)]
        model: String,
        /// Starting subset: TB_10, TB_30, or TB_89
        #[arg(long, default_value = "TB_10")]
        subset: String,
        /// Command that runs one subset pass and prints a SubsetReport JSON.
        /// Receives GYM_SUBSET, GYM_TASK_COUNT, and GYM_ITERATION in its env.
        #[arg(long)]
        bench_command: String,
        /// Iteration budget, 0 = unlimited
        #[arg(long, default_value_t = 0)]
        max_iterations: u64,
        /// Wall-clock budget in ms, 0 = unlimited
        #[arg(long, default_value_t = 0)]
        max_duration_ms: u64,
        #[arg(long, default_value_t = 0)]
        iteration_delay_ms: u64,
        /// Start fresh even if a running checkpoint exists
        #[arg(long)]
        no_resume: bool,
    },
    /// Print the persisted loop state
    Status,
}

/// Shells out for each subset pass.
struct ShellSubsetRunner {
    command: String,
}

#[async_trait::async_trait]
impl SubsetRunner for ShellSubsetRunner {
    async fn run_subset(&self, subset: Subset, iteration: u64) -> gym::Result<SubsetReport> {
        let exec = ExecCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), self.command.clone()],
            working_dir: None,
            timeout: None,
            env: vec![
                ("GYM_SUBSET".to_string(), subset.label().to_string()),
                ("GYM_TASK_COUNT".to_string(), subset.task_count().to_string()),
                ("GYM_ITERATION".to_string(), iteration.to_string()),
            ],
        };

        let result = LocalExecutor.execute(exec).await.map_err(|e| {
            GymError::IterationFailed {
                iteration,
                message: e.to_string(),
            }
        })?;
        if !result.success() {
            return Err(GymError::IterationFailed {
                iteration,
                message: format!(
                    "bench command exited {:?}: {}",
                    result.exit_code,
                    result.stderr.lines().last().unwrap_or(""),
                ),
            });
        }

        serde_json::from_str(&result.stdout).map_err(|e| GymError::IterationFailed {
            iteration,
            message: format!("bench command printed invalid SubsetReport: {e}"),
        })
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
    let workspace = WorkspaceLayout::at(&cli.workspace);
    workspace.ensure_dirs().context("create workspace dirs")?;

    match cli.command {
        Command::Run {
            model,
            subset,
            bench_command,
            max_iterations,
            max_duration_ms,
            iteration_delay_ms,
            no_resume,
        } => {
            let start_subset = Subset::parse(&subset)
                .with_context(|| format!("unknown subset '{subset}', expected TB_10/TB_30/TB_89"))?;

            let config = LoopConfig {
                start_subset,
                max_duration_ms,
                max_iterations,
                iteration_delay_ms,
                state_file_path: workspace.loop_state_path(),
                auto_resume: !no_resume,
                ..Default::default()
            };

            let mut runner = TrainingLoopRunner::new(
                config,
                workspace,
                Arc::new(ShellSubsetRunner {
                    command: bench_command,
                }),
                model,
            )?;

            let final_state = runner.run().await?;
            println!(
                "run {} finished: {:?}, {} iterations, subset {}, overall rate {:.2}",
                final_state.run_id,
                final_state.status,
                final_state.total_iterations,
                final_state.current_subset.label(),
                final_state.overall_success_rate(),
            );
        }
        Command::Status => {
            match LoopState::load(&workspace.loop_state_path())? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => {
                    eprintln!("no loop state at {}", workspace.loop_state_path().display());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
