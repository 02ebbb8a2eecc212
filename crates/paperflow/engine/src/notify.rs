//! Notification dispatch
//!
//! Delivery itself (mail, chat) lives behind the [`Notifier`] trait. The
//! [`RetryingNotifier`] applies a bounded [`RetryPolicy`] to any notifier,
//! and the [`NotificationDispatcher`] is what the engine hands events to
//! once a transition has been persisted. Delivery failures are logged and
//! never reach the caller of a transition.

use async_trait::async_trait;
use dashmap::DashMap;
use paperflow_types::{NotificationEvent, PaperId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Delivery failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// Worth retrying (timeouts, unavailable relay)
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Retrying will not help (unknown recipient, rejected payload)
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Delivers one notification event
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

// ── Retry ────────────────────────────────────────────────────────────

/// Bounded retry with a backoff schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the n-th failed attempt; the last entry repeats
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Retry without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Vec::new())
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len().saturating_sub(1));
        self.backoff.get(index).copied().unwrap_or(Duration::ZERO)
    }
}

/// Wraps a notifier with a retry policy
#[derive(Clone)]
pub struct RetryingNotifier {
    inner: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl RetryingNotifier {
    pub fn new(inner: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `event`, retrying transient failures.
    ///
    /// Returns the number of attempts used on success.
    pub async fn deliver(&self, event: &NotificationEvent) -> Result<u32, NotifyError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.notify(event).await {
                Ok(()) => {
                    tracing::debug!(
                        paper_id = %event.paper_id(),
                        kind = %event.kind(),
                        attempt,
                        "Notification delivered"
                    );
                    return Ok(attempt);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        paper_id = %event.paper_id(),
                        kind = %event.kind(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Notification delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        paper_id = %event.paper_id(),
                        kind = %event.kind(),
                        attempts = attempt,
                        error = %e,
                        "Giving up on notification"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for RetryingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.deliver(event).await.map(|_| ())
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// How the dispatcher runs deliveries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Spawn a task per batch; the caller does not wait
    Background,
    /// Deliver before returning, for tests and one-shot runs
    Inline,
}

/// Fire-and-forget hand-off from the engine to a retrying notifier
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: RetryingNotifier,
    mode: DispatchMode,
}

impl NotificationDispatcher {
    pub fn new(notifier: RetryingNotifier, mode: DispatchMode) -> Self {
        Self { notifier, mode }
    }

    pub fn background(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self::new(RetryingNotifier::new(notifier, policy), DispatchMode::Background)
    }

    pub fn inline(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self::new(RetryingNotifier::new(notifier, policy), DispatchMode::Inline)
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub async fn dispatch(&self, events: Vec<NotificationEvent>) {
        if events.is_empty() {
            return;
        }
        match self.mode {
            DispatchMode::Inline => deliver_all(&self.notifier, events).await,
            DispatchMode::Background => {
                let notifier = self.notifier.clone();
                tokio::spawn(async move { deliver_all(&notifier, events).await });
            }
        }
    }
}

async fn deliver_all(notifier: &RetryingNotifier, events: Vec<NotificationEvent>) {
    for event in &events {
        // Failures are logged by the retrying notifier
        let _ = notifier.deliver(event).await;
    }
}

// ── Notifiers ────────────────────────────────────────────────────────

/// Writes each event to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let recipients: Vec<String> = event.recipients().iter().map(|r| r.to_string()).collect();
        tracing::info!(
            paper_id = %event.paper_id(),
            tracking_number = %event.paper().tracking_number,
            kind = %event.kind(),
            recipients = ?recipients,
            "Notification"
        );
        Ok(())
    }
}

/// Records delivered events; failures can be scripted
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<NotificationEvent>>,
    attempts: AtomicU64,
    scripted: RwLock<VecDeque<NotifyError>>,
    failing_papers: DashMap<PaperId, NotifyError>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls with these errors, in order
    pub async fn fail_next(&self, errors: impl IntoIterator<Item = NotifyError>) {
        self.scripted.write().await.extend(errors);
    }

    /// Fail every event about `paper_id` until cleared
    pub fn fail_paper(&self, paper_id: PaperId, error: NotifyError) {
        self.failing_papers.insert(paper_id, error);
    }

    pub fn clear_failures(&self) {
        self.failing_papers.clear();
    }

    /// Successfully delivered events
    pub async fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.read().await.clone()
    }

    /// Every call, failed or not
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.scripted.write().await.pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing_papers.get(event.paper_id()) {
            return Err(error.value().clone());
        }
        self.sent.write().await.push(event.clone());
        Ok(())
    }
}
