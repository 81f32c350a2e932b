//! Metro - metrics relay daemon
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:2003, no destinations)
//! metro
//!
//! # Run against a config file
//! metro --config configs/metro.toml
//! metro --config configs/metro.toml --log-level debug
//! ```

mod app;
mod dispatch;
mod intake;

use anyhow::{Context, Result};
use clap::Parser;
use metro_config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Metro - metrics relay with consistent-hash routing and aggregation
#[derive(Parser, Debug)]
#[command(name = "metro")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    app::run(config).await
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
