// ABOUTME: Entry point for the berth CLI application.
// ABOUTME: Resolves connection config and runs runtime diagnostics.

mod cli;

use berth::config;
use berth::runtime::{Client, RuntimeConfig, RuntimeError};
use clap::Parser;
use cli::{Cli, Commands};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] config::Error),

    #[error("{}", .0.report())]
    Runtime(#[from] RuntimeError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let runtime_config = resolve_config(&cli)?;

    match cli.command {
        Commands::Doctor { json } => doctor(&runtime_config, json).await,
    }
}

/// File (explicit or discovered), then BERTH_* env, then flags.
fn resolve_config(cli: &Cli) -> Result<RuntimeConfig, CliError> {
    let base = match &cli.config {
        Some(path) => config::load(path)?,
        None => {
            let cwd = std::env::current_dir().map_err(config::Error::from)?;
            match config::discover(&cwd) {
                Ok(found) => found,
                Err(config::Error::ConfigNotFound(_)) => RuntimeConfig::default(),
                Err(e) => return Err(e.into()),
            }
        }
    };

    let mut resolved = base.with_env_overrides()?;
    if let Some(runtime) = cli.runtime {
        resolved.runtime = runtime;
    }
    if let Some(socket) = &cli.socket {
        resolved.socket = Some(socket.clone());
    }
    if let Some(timeout) = cli.timeout {
        resolved.timeout = timeout;
    }
    Ok(resolved)
}

async fn doctor(runtime_config: &RuntimeConfig, json: bool) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let client = Client::connect(runtime_config).await?;
    let pinged = client.ping(&cancel).await;
    client.close();
    pinged?;

    let info = client.runtime_info();
    if json {
        println!("{}", serde_json::to_string_pretty(info)?);
    } else {
        println!("Runtime:     {}", info.runtime_type);
        println!("Version:     {}", info.version);
        println!("API version: {}", info.api_version);
        println!("Rootless:    {}", info.rootless);
        println!("Socket:      {}", info.socket_path.display());
        println!("Platform:    {}/{}", info.os, info.arch);
    }
    Ok(())
}
