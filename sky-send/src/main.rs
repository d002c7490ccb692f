//! sky-send - Background worker for Bluesky crossposts
//!
//! Drains the Skyshare task queue: delivers queued posts and runs the
//! recurring session refresh.

use anyhow::{Context, Result};
use clap::Parser;
use libskyshare::logging::LoggingConfig;
use libskyshare::{Config, SkyshareError, SkyshareService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sky-send")]
#[command(version)]
#[command(about = "Background worker that delivers queued Bluesky crossposts")]
#[command(long_about = "\
sky-send - Background worker for Bluesky crossposts

DESCRIPTION:
    sky-send is a long-running daemon that polls the Skyshare task queue.
    Publishing content (sky-hook publish) only queues a crosspost; this
    worker refreshes the session and creates the post on Bluesky. It also
    runs the recurring session refresh scheduled by `sky-hook install`.

    Each queued post is attempted once. Failures are recorded on the task
    and are not retried.

USAGE:
    # Run in foreground (logs to stderr)
    sky-send

    # Run with custom poll interval
    sky-send --poll-interval 30

    # Enable verbose logging
    sky-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current pass)

CONFIGURATION:
    Configuration file: ~/.config/skyshare/config.toml (or $SKYSHARE_CONFIG)
    Database location: ~/.local/share/skyshare/skyshare.db

    [scheduling]
    poll_interval = 60            # seconds between polls
    refresh_interval = \"1week\"    # session refresh cadence

ENVIRONMENT:
    SKYSHARE_LOG_FORMAT - text, json or pretty
    SKYSHARE_LOG_LEVEL  - default log level (RUST_LOG overrides)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due tasks once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SkyshareError>() {
        Some(SkyshareError::Config(_)) => 2,
        Some(_) | None => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let poll_interval = cli
        .poll_interval
        .unwrap_or(config.scheduling.poll_interval)
        .max(1);

    let service = SkyshareService::from_config(config)
        .await
        .context("Failed to initialize Skyshare")?;

    info!("sky-send worker starting");

    if cli.once {
        let summary = service.worker().run_pending(chrono::Utc::now()).await?;
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "processed due tasks once, exiting"
        );
        println!(
            "Processed {} task(s): {} succeeded, {} failed",
            summary.processed, summary.succeeded, summary.failed
        );
    } else {
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;

        info!(poll_interval, "polling task queue");
        service
            .worker()
            .run(Duration::from_secs(poll_interval), shutdown)
            .await?;
    }

    info!("sky-send worker stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received shutdown signal, stopping gracefully");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, stopping gracefully");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
