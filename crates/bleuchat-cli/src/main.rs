//! BleuChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bleuchat_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(AppConfig::default_data_dir);
    info!("Using data directory {}", data_dir.display());

    CommandDispatcher::execute(cli.command(), config, data_dir)
        .await
        .context("Command failed")?;
    Ok(())
}

/// Logs go to stderr; stdout carries the chat
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
