//! `chat-adapter` binary entrypoint.
//!
//! This starts the Actix server using configuration from environment variables
//! and an optional YAML file.

use chat_adapter::{serve, AdapterConfig};
use clap::Parser;
use std::path::PathBuf;

/// OpenAI-compatible chat completions backed by the Anthropic Messages API
#[derive(Parser, Debug)]
#[command(name = "chat-adapter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (default: <config dir>/chat-adapter/config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AdapterConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    // Respect `RUST_LOG` if set; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    serve(config).await
}
