//! Paperflow Daemon - background deadline scanning for concept papers
//!
//! The daemon provides:
//! - Periodic stage-overdue and paper-deadline sweeps
//! - Deduplicated deadline notifications
//! - Retrying notification delivery

use clap::Parser;
use paperflow_daemon::{init_logging, shutdown_signal, Daemon, DaemonConfig, DaemonResult};
use tokio::sync::watch;

/// Paperflow Daemon CLI
#[derive(Parser)]
#[command(name = "paperflowd")]
#[command(about = "Paperflow Daemon - concept paper deadline scanner", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PAPERFLOW_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "PAPERFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "PAPERFLOW_LOG_JSON")]
    json: bool,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    config.validate()?;

    init_logging(&config.logging.level, config.logging.json)?;

    let daemon = Daemon::new(config);

    if cli.once {
        let report = daemon.run_once().await;
        tracing::info!(
            overdue_notified = report.overdue.notified,
            deadline_notified = report.deadline.notified,
            "Single scan complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    daemon.run(shutdown_rx).await
}
