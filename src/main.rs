//! # WATTSCOPE Link
//!
//! Headless client for the WATTSCOPE station backend.
//!
//! Connects to the backend WebSocket, falls back to synthetic readings while
//! it is unreachable, and reports every update either through the log or as
//! JSON lines on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use wattscope_link::config::{Config, LoggingConfig, StartupMode};
use wattscope_link::coordinator::presenter::{JsonLinesPresenter, Presenter, TracingPresenter};
use wattscope_link::runtime::Session;

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "wattscope-link.log";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "wattscope-link", version, about = "Live telemetry link for the WATTSCOPE station")]
struct Args {
    /// Path to the TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Never connect to the backend; synthetic data only
    #[arg(long)]
    simulate: bool,

    /// Write updates to stdout as JSON lines
    #[arg(long)]
    json: bool,
}

/// Main entry point for WATTSCOPE Link
///
/// # Control Flow
///
/// 1. Parse arguments and load configuration
/// 2. Set up logging (console, plus a daily file when configured)
/// 3. Run the session until Ctrl+C, then close the connection
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or is invalid. Nothing
/// that happens on the connection is fatal.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if args.simulate {
        config.station.mode = StartupMode::Simulation;
    }

    let _guard = init_tracing(&config.logging, args.json)?;

    info!("WATTSCOPE Link v{} starting...", env!("CARGO_PKG_VERSION"));
    match config.station.mode {
        StartupMode::Live => info!("Backend stream: {}", config.stream.url),
        StartupMode::Simulation => info!("Simulation mode, backend disabled"),
    }

    let presenter: Box<dyn Presenter> = if args.json {
        Box::new(JsonLinesPresenter::new(std::io::stdout()))
    } else {
        Box::new(TracingPresenter)
    };

    let (session, handle) = Session::from_config(&config, presenter)?;
    let task = tokio::spawn(session.run());

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    if let Ok(status) = handle.status().await {
        info!(
            "Final status: {} solar / {} turbine points, {} log entries",
            status.solar_points, status.turbine_points, status.log_entries
        );
    }
    handle.shutdown().await?;
    task.await.context("Session task panicked")??;

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. In JSON mode console logs go to
/// stderr so stdout carries only updates.
fn init_tracing(logging: &LoggingConfig, json: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console_writer = if json {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let console = fmt::layer().with_writer(console_writer);

    let (file, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
