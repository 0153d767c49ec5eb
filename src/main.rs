//! CLI entry point for the dashcam downloader.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dashcam_core::config::load_default_file_config;
use tracing::{debug, info};

mod app;
mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.global.quiet {
        "error"
    } else {
        match cli.global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let Some(command) = cli.command else {
        info!("No command given. Try `dashcam-downloader fetch norm` or `--help`.");
        return Ok(ExitCode::SUCCESS);
    };

    let loaded = load_default_file_config().context("loading config file")?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "using config file");
    }
    let settings = app::resolve_settings(&cli.global, &loaded.config)?;
    debug!(?settings, "effective settings");

    app::run(command, &settings, cli.global.quiet).await
}
