//! Undertow CLI - Command-line interface
//!
//! Runs playback scenarios, probes hosted URLs, and inspects magnet links.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use undertow_core::UndertowError;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Hosted-first playback with BitTorrent fallback")]
#[command(version)]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace of the last run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    let result = commands::handle_command(cli.command).await;
    if let Some(error) = result.as_ref().err().and_then(|e| e.downcast_ref::<UndertowError>()) {
        tracing::error!(
            %error,
            user_error = error.is_user_error(),
            "{}",
            error.user_message()
        );
    }
    result
}
