//! `testgen` — generate a verification suite for a task and print it.
//!
//! The comparator flow: run once with `--model local` and once with
//! `--model claude`, then diff the two suites.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use llm::ChatProvider;
use testgen::{
    EnvironmentInfo, IterativeTestGenerator, TestGenConfigInput, TestGenEvent,
};

#[derive(Parser)]
#[command(name = "testgen", about = "Generate verification tests for a task")]
struct Cli {
    /// Task identifier
    #[arg(long)]
    task: String,

    /// Backend: "local" (FM bridge) or "claude"
    #[arg(long, default_value = "local")]
    model: String,

    /// Task working directory to introspect
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// File holding the task description; defaults to <workdir>/task.md
    #[arg(long)]
    description_file: Option<PathBuf>,

    /// Print each test as it streams in
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let description_path = cli
        .description_file
        .clone()
        .unwrap_or_else(|| cli.workdir.join("task.md"));
    let description = std::fs::read_to_string(&description_path)
        .with_context(|| format!("cannot read task description at {}", description_path.display()))?;

    let provider: Arc<dyn ChatProvider> = match cli.model.as_str() {
        "local" => Arc::new(fm_bridge::FmBridgeClient::local()),
        "claude" => Arc::new(llm::AnthropicClient::new("claude-sonnet-4-5")),
        other => anyhow::bail!("unknown model '{other}', expected 'local' or 'claude'"),
    };

    let env = EnvironmentInfo::probe(&cli.workdir, &description)?;
    let generator = IterativeTestGenerator::new(provider, TestGenConfigInput::default());

    let verbose = cli.verbose;
    let mut sink = |event: TestGenEvent| match &event {
        TestGenEvent::Test { test } if verbose => {
            println!(
                "[{}] {} -> {}",
                test.category.as_str(),
                test.input,
                test.expected_output.as_deref().unwrap_or("(no match)")
            );
        }
        TestGenEvent::Reflection { category, round, outcome } if verbose => {
            println!(
                "[reflect {} r{round}] score {:.1}, action {:?}",
                category.as_str(),
                outcome.comprehensiveness_score,
                outcome.action
            );
        }
        TestGenEvent::Error { message } => eprintln!("error: {message}"),
        _ => {}
    };

    let summary = generator
        .generate(&cli.task, &description, &env, &mut sink)
        .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary.tests).context("serialize suite")?
    );
    eprintln!(
        "task {}: {} tests, {} rounds, score {:.2}, {} tokens, {} ms",
        cli.task,
        summary.tests.len(),
        summary.total_rounds,
        summary.comprehensiveness_score,
        summary.total_tokens,
        summary.duration_ms,
    );

    Ok(())
}
