//! Daemon service: wires the engine and the deadline scanner together

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use paperflow_engine::{
    Clock, DeadlineScanner, DedupStore, InMemoryDedupStore, InMemoryPaperStore,
    NotificationDispatcher, Notifier, PaperStore, RetryingNotifier, ScanReport, SystemClock,
    TracingNotifier, WorkflowEngine,
};
use std::sync::Arc;
use tokio::sync::watch;

/// A running paperflow instance
pub struct Daemon {
    config: DaemonConfig,
    engine: Arc<WorkflowEngine>,
    scanner: Arc<DeadlineScanner>,
}

impl Daemon {
    /// In-memory storage, log-only notifications, wall clock
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_components(
            config,
            Arc::new(InMemoryPaperStore::new()),
            Arc::new(InMemoryDedupStore::new()),
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
        )
    }

    pub fn with_components(
        config: DaemonConfig,
        store: Arc<dyn PaperStore>,
        dedup: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = config.notifications.retry_policy();

        let engine = WorkflowEngine::new(
            store.clone(),
            NotificationDispatcher::background(notifier.clone(), policy.clone()),
        )
        .with_clock(clock.clone());

        let scanner = DeadlineScanner::new(
            store,
            dedup,
            Arc::new(RetryingNotifier::new(notifier, policy)),
        )
        .with_clock(clock)
        .with_dedup_ttl(config.scanner.dedup_ttl())
        .with_max_in_flight(config.scanner.max_in_flight);

        Self {
            config,
            engine: Arc::new(engine),
            scanner: Arc::new(scanner),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// One scan, then return
    pub async fn run_once(&self) -> ScanReport {
        self.scanner.run_now().await
    }

    /// Scan on the configured interval until `shutdown` fires
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> DaemonResult<()> {
        tracing::info!(
            interval_secs = self.config.scanner.interval_secs,
            dedup_ttl_secs = self.config.scanner.dedup_ttl_secs,
            max_attempts = self.config.notifications.max_attempts,
            "Starting paperflow daemon"
        );

        let handle = self.scanner.clone().spawn(
            self.config.scanner.interval(),
            self.config.scanner.run_on_startup,
            shutdown,
        );
        handle
            .await
            .map_err(|e| DaemonError::Scanner(e.to_string()))?;

        tracing::info!("Paperflow daemon stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use paperflow_engine::{ManualClock, MemoryNotifier};
    use paperflow_types::*;

    fn daemon_with(notifier: Arc<MemoryNotifier>, clock: Arc<ManualClock>) -> Daemon {
        let mut config = DaemonConfig::default();
        config.notifications.backoff_secs = vec![0];
        Daemon::with_components(
            config,
            Arc::new(InMemoryPaperStore::new()),
            Arc::new(InMemoryDedupStore::new()),
            notifier,
            clock,
        )
    }

    #[tokio::test]
    async fn test_run_once_reports_deadline_notifications() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = Arc::new(ManualClock::new(start));
        let daemon = daemon_with(notifier.clone(), clock.clone());

        daemon
            .engine()
            .submit(
                &AuthContext::user(User::new("req-1", "Rosa", Role::Requisitioner)),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap();

        clock.advance(Duration::days(8));
        let first = daemon.run_once().await;
        assert_eq!(first.deadline.notified, 1);
        assert_eq!(first.overdue.notified, 1);

        let second = daemon.run_once().await;
        assert_eq!(second.deadline.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn test_scanner_retries_transient_failures() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = Arc::new(ManualClock::new(start));
        let daemon = daemon_with(notifier.clone(), clock.clone());

        daemon
            .engine()
            .submit(
                &AuthContext::user(User::new("req-1", "Rosa", Role::Requisitioner)),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap();
        // Let the background assignment notification land first
        for _ in 0..50 {
            if !notifier.sent().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        notifier
            .fail_next(vec![paperflow_engine::NotifyError::Transient("timeout".into())])
            .await;
        clock.advance(Duration::days(2));
        let report = daemon.run_once().await;
        assert_eq!(report.overdue.notified, 1);
        assert_eq!(report.overdue.failed, 0);
    }

    #[tokio::test]
    async fn test_oversized_dedup_ttl_does_not_abort_scan() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let mut config = DaemonConfig::default();
        config.scanner.dedup_ttl_secs = u64::MAX;
        assert!(config.validate().is_err());

        // Wired without validation, the scan still completes
        let daemon = Daemon::with_components(
            config,
            Arc::new(InMemoryPaperStore::new()),
            Arc::new(InMemoryDedupStore::new()),
            Arc::new(MemoryNotifier::new()),
            clock.clone(),
        );
        daemon
            .engine()
            .submit(
                &AuthContext::user(User::new("req-1", "Rosa", Role::Requisitioner)),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap();

        clock.advance(Duration::days(8));
        let report = daemon.run_once().await;
        assert_eq!(report.deadline.found, 1);
        assert_eq!(report.deadline.failed, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let daemon = Daemon::new(DaemonConfig::default());
        let (tx, rx) = watch::channel(false);
        let running = tokio::spawn(daemon.run(rx));
        tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }
}
