//! Deadline scanner: periodic overdue and deadline notifications
//!
//! Two independent sweeps run on every scan:
//!
//! - **Stage overdue**: every open stage whose deadline has passed is
//!   notified, on every run, for as long as it stays overdue.
//! - **Paper deadline**: every unfinished paper at or past its overall
//!   deadline is notified at most once per dedup window.
//!
//! The scanner never changes paper or stage state. Deliveries within a
//! sweep run concurrently, up to `max_in_flight` at a time, so one
//! recipient's retries do not hold up the rest. A failure for one item is
//! logged and counted without affecting the others.

use crate::clock::{Clock, SystemClock};
use crate::dedup::{DedupKey, DedupStore};
use crate::notify::Notifier;
use crate::store::PaperStore;
use chrono::{DateTime, Duration, Utc};
use paperflow_types::*;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Default lifetime of a deadline dedup record
pub const DEFAULT_DEDUP_TTL_DAYS: i64 = 7;

/// Default bound on concurrent deliveries per sweep
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Outcome of one sweep
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items selected by the sweep query
    pub found: usize,
    pub notified: usize,
    /// Already notified within the dedup window
    pub skipped_duplicates: usize,
    pub failed: usize,
    /// A previous run of this sweep was still in progress
    pub skipped_overlap: bool,
    /// The sweep query itself failed
    pub errored: bool,
}

/// Outcome of one scan
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub at: DateTime<Utc>,
    pub overdue: SweepReport,
    pub deadline: SweepReport,
}

/// Periodic sweep over stage and paper deadlines
pub struct DeadlineScanner {
    store: Arc<dyn PaperStore>,
    dedup: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    dedup_ttl: Duration,
    max_in_flight: usize,
    overdue_running: Mutex<()>,
    deadline_running: Mutex<()>,
}

impl DeadlineScanner {
    pub fn new(
        store: Arc<dyn PaperStore>,
        dedup: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            dedup,
            notifier,
            clock: Arc::new(SystemClock),
            dedup_ttl: Duration::days(DEFAULT_DEDUP_TTL_DAYS),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            overdue_running: Mutex::new(()),
            deadline_running: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    /// At least one delivery is always allowed
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Scan as of the scanner's clock
    pub async fn run_now(&self) -> ScanReport {
        self.run_once(self.clock.now()).await
    }

    /// Run both sweeps as of `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> ScanReport {
        let overdue = self.sweep_overdue_stages(now).await;
        let deadline = self.sweep_paper_deadlines(now).await;

        tracing::info!(
            overdue_found = overdue.found,
            overdue_notified = overdue.notified,
            overdue_failed = overdue.failed,
            deadline_found = deadline.found,
            deadline_notified = deadline.notified,
            deadline_skipped = deadline.skipped_duplicates,
            deadline_failed = deadline.failed,
            "Deadline scan finished"
        );

        ScanReport {
            at: now,
            overdue,
            deadline,
        }
    }

    /// Notify the owner of every open stage past its deadline
    pub async fn sweep_overdue_stages(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let Ok(_running) = self.overdue_running.try_lock() else {
            tracing::warn!("Stage overdue sweep still running, skipping");
            report.skipped_overlap = true;
            return report;
        };

        let records = match self.store.list_overdue_stages(now).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query overdue stages");
                report.errored = true;
                return report;
            }
        };
        report.found = records.len();

        let mut deliveries = JoinSet::new();
        for record in records {
            self.wait_for_slot(&mut deliveries, &mut report).await;

            let notifier = self.notifier.clone();
            deliveries.spawn(async move {
                let event = NotificationEvent::StageOverdue {
                    recipient: Recipient::for_stage(&record.stage),
                    stage: StageSnapshot::from(&record.stage),
                    paper: record.paper,
                };
                match notifier.notify(&event).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            paper_id = %event.paper_id(),
                            stage_order = record.stage.stage_order,
                            error = %e,
                            "Overdue notification failed"
                        );
                        false
                    }
                }
            });
        }
        while let Some(outcome) = deliveries.join_next().await {
            tally(&mut report, outcome);
        }

        report
    }

    /// Notify the requisitioner of every unfinished paper past its
    /// deadline, once per dedup window
    pub async fn sweep_paper_deadlines(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let Ok(_running) = self.deadline_running.try_lock() else {
            tracing::warn!("Paper deadline sweep still running, skipping");
            report.skipped_overlap = true;
            return report;
        };

        match self.dedup.purge_expired(now).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Purged expired dedup records"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge dedup records"),
        }

        let papers = match self.store.list_papers_past_deadline(now).await {
            Ok(papers) => papers,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query papers past deadline");
                report.errored = true;
                return report;
            }
        };
        report.found = papers.len();

        let mut deliveries = JoinSet::new();
        for paper in papers {
            let key = DedupKey::paper_deadline(&paper.id);
            match self.dedup.claim(&key, self.dedup_ttl, now).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        paper_id = %paper.id,
                        key = %key,
                        "Deadline notification already sent"
                    );
                    report.skipped_duplicates += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(paper_id = %paper.id, error = %e, "Dedup claim failed");
                    report.failed += 1;
                    continue;
                }
            }

            self.wait_for_slot(&mut deliveries, &mut report).await;

            let notifier = self.notifier.clone();
            let dedup = self.dedup.clone();
            deliveries.spawn(async move {
                let event = NotificationEvent::PaperDeadlineReached {
                    paper: PaperSnapshot::from(&paper),
                    recipient: Recipient::User(paper.requisitioner.clone()),
                };
                match notifier.notify(&event).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            paper_id = %paper.id,
                            tracking_number = %paper.tracking_number,
                            error = %e,
                            "Deadline notification failed, releasing dedup key"
                        );
                        if let Err(e) = dedup.release(&key).await {
                            tracing::error!(
                                key = %key,
                                error = %e,
                                "Failed to release dedup key"
                            );
                        }
                        false
                    }
                }
            });
        }
        while let Some(outcome) = deliveries.join_next().await {
            tally(&mut report, outcome);
        }

        report
    }

    /// Block until fewer than `max_in_flight` deliveries are running
    async fn wait_for_slot(&self, deliveries: &mut JoinSet<bool>, report: &mut SweepReport) {
        while deliveries.len() >= self.max_in_flight {
            match deliveries.join_next().await {
                Some(outcome) => tally(report, outcome),
                None => break,
            }
        }
    }

    /// Scan every `interval` until `shutdown` turns true or its sender is
    /// dropped. With `run_immediately`, the first scan happens at once.
    pub fn spawn(
        self: Arc<Self>,
        interval: std::time::Duration,
        run_immediately: bool,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !run_immediately {
                // The first tick completes immediately
                ticker.tick().await;
            }

            tracing::info!(interval_secs = interval.as_secs(), "Deadline scanner started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_now().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Deadline scanner stopped");
        })
    }
}

fn tally(report: &mut SweepReport, outcome: Result<bool, JoinError>) {
    match outcome {
        Ok(true) => report.notified += 1,
        Ok(false) => report.failed += 1,
        Err(e) => {
            tracing::error!(error = %e, "Notification task failed");
            report.failed += 1;
        }
    }
}
