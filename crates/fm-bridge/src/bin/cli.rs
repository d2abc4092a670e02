//! `fm` — command-line front end for the local Foundation Models bridge.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fm_bridge::{BridgeLauncher, FmBridgeClient, LaunchConfig};
use llm::{ChatMessage, ChatRequest};

#[derive(Parser)]
#[command(name = "fm", about = "Talk to the local Foundation Models bridge")]
struct Cli {
    /// Bridge base URL (defaults to FM_BRIDGE_URL or the local bridge)
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the bridge health JSON; exits non-zero when unavailable
    Health,
    /// List models the bridge serves
    Models,
    /// Send a one-shot prompt
    Chat {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        /// Start the bridge if it is not running
        #[arg(long)]
        autostart: bool,
    },
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
    let client = match &cli.base_url {
        Some(url) => FmBridgeClient::new(url.clone()),
        None => FmBridgeClient::local(),
    };

    match cli.command {
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_running() {
                std::process::exit(1);
            }
        }
        Command::Models => {
            let models = client.models().await?;
            for model in models {
                println!("{}", model.id);
            }
        }
        Command::Chat {
            prompt,
            model,
            autostart,
        } => {
            if autostart {
                let launcher = BridgeLauncher::new(LaunchConfig::default());
                launcher.ensure_running(&client).await?;
            }
            let mut request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
            request.model = model;
            let response = client.chat_completion(&request).await?;
            println!("{}", response.content().unwrap_or_default());
        }
    }

    Ok(())
}
