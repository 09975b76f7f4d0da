// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Global connection flags plus the doctor subcommand.

use berth::runtime::RuntimeMode;
use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Container runtime client for Docker and Podman")]
#[command(version)]
pub struct Cli {
    /// Runtime to use: auto, podman or docker
    #[arg(long, global = true)]
    pub runtime: Option<RuntimeMode>,

    /// Explicit runtime socket (disables auto-detection)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Timeout for runtime API calls (e.g. 30s, 2m)
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Config file (defaults to berth.yml in the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect a runtime and report what was found, or how to fix it
    Doctor {
        /// Print runtime info as JSON
        #[arg(long)]
        json: bool,
    },
}
