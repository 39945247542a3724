//! llm-doctor CLI - OpenAI-compatible mock server
//!
//! Usage:
//!   llm-doctor serve [OPTIONS]    Start the HTTP server
//!
//! Examples:
//!   llm-doctor serve --port 8032
//!   llm-doctor serve --config doctor.yaml
//!   OPENAI_API_KEY=sk-... llm-doctor serve    # forward to the real API
//!   llm-doctor serve --tui                    # Start with the live dashboard

use clap::{Parser, Subcommand};
use llm_doctor::cli::{AppState, Config, ConfigError};
use llm_doctor::tui::{run_dashboard, DashboardConfig};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "llm-doctor")]
#[command(author, version, about = "OpenAI-compatible mock server with fault injection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the llm-doctor HTTP server
    Serve(ServeArgs),
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Configuration file path (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Upstream API key; enables passthrough
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Upstream base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Force this model on every forwarded request
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// Show the live request dashboard (TUI)
    #[arg(long)]
    tui: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn build_config(args: &ServeArgs) -> Result<Config, ConfigError> {
    let mut config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Override with CLI arguments
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.as_ref() {
        config.server.host = host.clone();
    }
    if let Some(key) = args.api_key.as_ref().filter(|k| !k.is_empty()) {
        config.passthrough.api_key = Some(key.clone());
    }
    if let Some(url) = args.base_url.as_ref() {
        config.passthrough.base_url = Some(url.clone());
    }
    if let Some(model) = args.model.as_ref() {
        config.passthrough.model = Some(model.clone());
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("llm_doctor=info".parse()?)
        .add_directive("tower_http=debug".parse()?);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = build_config(&args)?;
            let state = Arc::new(AppState::new(config, llm_doctor::new_shared_stats()));

            if args.tui {
                // No stdout subscriber: it would corrupt the dashboard.
                // TUI exit shuts down the app.
                tokio::select! {
                    result = llm_doctor::cli::run_server_with_state(state.clone()) => {
                        result?;
                    }
                    result = run_dashboard(state, DashboardConfig::default()) => {
                        result?;
                    }
                }
            } else {
                init_tracing(args.json_logs)?;
                llm_doctor::cli::run_server_with_state(state).await?;
            }
        }
    }

    Ok(())
}
