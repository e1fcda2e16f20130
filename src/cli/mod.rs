use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod models;
pub mod serve;

use crate::ai::chat::{ChatBuilder, ChatOrchestrator};
use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session (default)
    Chat {
        /// Model to start with instead of the lightest available one
        #[arg(long)]
        model: Option<String>,
    },
    /// Print the models available to your API key as JSON
    Models {},
    /// Run the API server and web UI
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML secrets file holding GEMINI_API_KEY
    #[arg(long, global = true)]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let secrets_path = AppConfig::secrets_path(args.secrets);

    match args.command {
        Some(Command::Chat { model }) => {
            init_cli_tracing();
            chat::run(&secrets_path, model).await?;
        }
        Some(Command::Models {}) => {
            init_cli_tracing();
            models::run(&secrets_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(&secrets_path, host, port).await?;
        }
        None => {
            init_cli_tracing();
            chat::run(&secrets_path, None).await?;
        }
    }

    Ok(())
}

// Logs go to stderr so they never interleave with the transcript
fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the config and resolve the model catalog. Nothing else can
/// run without both so any failure here stops the program.
pub async fn bootstrap(secrets_path: &std::path::Path) -> Result<ChatOrchestrator> {
    let config = AppConfig::load(secrets_path).context("🔐 Configuration failed")?;
    let orchestrator = ChatBuilder::from_config(&config)
        .bootstrap()
        .await
        .context("🔐 Configuration failed")?;
    Ok(orchestrator)
}
