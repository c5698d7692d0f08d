//! Surge CLI - Command-line interface
//!
//! Runs, compares and watches load-balancing simulations.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use surge_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "surge")]
#[command(about = "Discrete-time load-balancing simulator")]
#[command(version)]
struct Cli {
    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Also write a full trace log to this directory
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
