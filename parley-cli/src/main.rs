//! Parley CLI - conversation-augmented completions from the terminal.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parley::prelude::*;
use parley_cli::{Backend, ChatSession, ChatSessionConfig, Runtime};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Parley - conversation-augmented LLM completions
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file; environment variables override it
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Keep histories and stream topics in memory instead of Redis
    #[arg(long, global = true)]
    memory: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one JSON request and print `{"response": ...}`
    Ask {
        /// Request file; stdin when omitted
        #[arg(short, long)]
        request: Option<PathBuf>,
    },
    /// Chat interactively on a remembered, streamed conversation
    Chat {
        /// Conversation key; reuse it to resume a conversation
        #[arg(short, long)]
        key: String,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// System context sent with every turn
        #[arg(short, long)]
        system: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parley=debug,parley_cli=debug")
    } else {
        EnvFilter::new("parley=warn,parley_cli=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn read_request(path: Option<&PathBuf>) -> anyhow::Result<RequestSpec> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    serde_json::from_str(&raw).context("request is not a valid RequestSpec")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_ref())?;
    let backend = if args.memory {
        Backend::Memory
    } else {
        Backend::Redis
    };
    let runtime = Runtime::connect(config, backend, &EnvSecretProvider).await?;

    match args.command {
        Command::Ask { request } => {
            let spec = read_request(request.as_ref())?;
            match runtime.orchestrator.handle(spec).await {
                Ok(response) => println!("{}", serde_json::to_string(&response)?),
                Err(e) => {
                    error!(kind = ?e.kind(), retryable = e.is_retryable(), "request failed");
                    return Err(e.into());
                }
            }
        }
        Command::Chat { key, model, system } => {
            info!(key = %key, "starting chat");
            let session = ChatSession::new(
                runtime.orchestrator,
                runtime.topics,
                ChatSessionConfig { key, model, system },
            );
            session.run().await?;
        }
    }

    Ok(())
}
