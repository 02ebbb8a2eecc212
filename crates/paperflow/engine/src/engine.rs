//! Workflow engine: the public surface of the stage engine
//!
//! Every mutating operation follows the same path:
//!
//! 1. Resolve the authenticated user (401 if absent)
//! 2. Take the per-paper lock and load the paper fresh from the store
//! 3. Authorize against the loaded stage
//! 4. Apply the transition in memory and check invariants
//! 5. Persist with an optimistic version check
//! 6. Release the lock and hand the produced events to dispatch
//!
//! Nothing is written unless steps 3 to 5 all succeed.

use crate::authorization::AuthorizationPolicy;
use crate::clock::{Clock, SystemClock};
use crate::locks::PaperLocks;
use crate::notify::NotificationDispatcher;
use crate::state_machine::StageStateMachine;
use crate::store::PaperStore;
use chrono::{DateTime, Datelike, Utc};
use paperflow_types::*;
use std::sync::Arc;

/// The concept paper workflow service
pub struct WorkflowEngine {
    store: Arc<dyn PaperStore>,
    locks: PaperLocks,
    policy: AuthorizationPolicy,
    machine: StageStateMachine,
    catalog: DeadlineCatalog,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn PaperStore>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            store,
            locks: PaperLocks::new(),
            policy: AuthorizationPolicy::new(),
            machine: StageStateMachine::new(),
            catalog: DeadlineCatalog::standard(),
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_catalog(mut self, catalog: DeadlineCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    pub fn catalog(&self) -> &DeadlineCatalog {
        &self.catalog
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Submit a new concept paper and activate its first stage.
    pub async fn submit(
        &self,
        auth: &AuthContext,
        draft: PaperDraft,
    ) -> WorkflowResult<ConceptPaper> {
        let user = auth.require_user()?;
        if !user.is_active {
            return Err(WorkflowError::forbidden(&user.id, "account is inactive"));
        }
        draft.validate()?;
        let option = self.catalog.resolve(&draft.deadline_option)?.clone();

        let now = self.clock.now();
        let sequence = self.store.next_tracking_sequence(now.year()).await?;
        let tracking_number = TrackingNumber::from_sequence(now.year(), sequence);

        let mut paper = ConceptPaper::new(draft, user, tracking_number, &option, now)?;
        let events = self.machine.initialize(&mut paper, now)?;
        paper.check_invariants()?;
        let stored = self.store.insert_paper(paper).await?;

        tracing::info!(
            paper_id = %stored.id,
            tracking_number = %stored.tracking_number,
            requisitioner = %stored.requisitioner,
            deadline_option = %option.key,
            "Concept paper submitted"
        );

        self.dispatcher.dispatch(events).await;
        Ok(stored)
    }

    /// Approve a stage with a signature and optional remarks.
    pub async fn approve(
        &self,
        auth: &AuthContext,
        stage_id: &StageId,
        signature: &str,
        remarks: Option<String>,
    ) -> WorkflowResult<ConceptPaper> {
        let user = auth.require_user()?;
        self.transition(stage_id, "approve", |paper, order, now| {
            self.authorize_stage(user, paper, order)?;
            self.machine.approve(paper, order, user, signature, remarks, now)
        })
        .await
    }

    /// Return a stage to its predecessor. Remarks are required.
    pub async fn return_stage(
        &self,
        auth: &AuthContext,
        stage_id: &StageId,
        remarks: &str,
    ) -> WorkflowResult<ConceptPaper> {
        let user = auth.require_user()?;
        self.transition(stage_id, "return", |paper, order, now| {
            self.authorize_stage(user, paper, order)?;
            self.machine.return_stage(paper, order, user, remarks, now)
        })
        .await
    }

    /// Assign a stage to a specific user. Administrators only.
    pub async fn reassign(
        &self,
        auth: &AuthContext,
        stage_id: &StageId,
        assignee: &User,
    ) -> WorkflowResult<ConceptPaper> {
        let user = auth.require_user()?;
        self.policy.require_admin(user)?;
        self.transition(stage_id, "reassign", |paper, order, now| {
            self.machine.reassign(paper, order, user, assignee, now)
        })
        .await
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Load a paper the caller may read
    pub async fn get_paper(
        &self,
        auth: &AuthContext,
        paper_id: &PaperId,
    ) -> WorkflowResult<ConceptPaper> {
        let user = auth.require_user()?;
        let paper = self.load(paper_id).await?;
        self.policy.authorize_read(user, &paper)?;
        Ok(paper)
    }

    /// The stage the paper is waiting on; `None` once completed
    pub async fn current_stage(
        &self,
        auth: &AuthContext,
        paper_id: &PaperId,
    ) -> WorkflowResult<Option<WorkflowStage>> {
        let paper = self.get_paper(auth, paper_id).await?;
        Ok(paper.current_stage().cloned())
    }

    /// Deadline standing of the paper and its current stage, as of now
    pub async fn overdue_status(
        &self,
        auth: &AuthContext,
        paper_id: &PaperId,
    ) -> WorkflowResult<OverdueStatus> {
        self.overdue_status_at(auth, paper_id, self.clock.now()).await
    }

    pub async fn overdue_status_at(
        &self,
        auth: &AuthContext,
        paper_id: &PaperId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<OverdueStatus> {
        let paper = self.get_paper(auth, paper_id).await?;
        Ok(paper.overdue_status(now))
    }

    /// Papers whose current stage the caller may act on, earliest stage
    /// deadline first
    pub async fn papers_awaiting(&self, auth: &AuthContext) -> WorkflowResult<Vec<ConceptPaper>> {
        let user = auth.require_user()?;
        let mut papers: Vec<_> = self
            .store
            .list_papers()
            .await?
            .into_iter()
            .filter(|p| {
                p.current_stage()
                    .map(|s| s.is_open() && self.policy.can_act(user, s))
                    .unwrap_or(false)
            })
            .collect();
        papers.sort_by_key(|p| p.current_stage().and_then(|s| s.deadline));
        Ok(papers)
    }

    /// Papers submitted by `requisitioner`. Callers see their own papers;
    /// administrators see anyone's.
    pub async fn papers_for_requisitioner(
        &self,
        auth: &AuthContext,
        requisitioner: &UserId,
    ) -> WorkflowResult<Vec<ConceptPaper>> {
        let user = auth.require_user()?;
        if !user.is_active {
            return Err(WorkflowError::forbidden(&user.id, "account is inactive"));
        }
        if &user.id != requisitioner && !user.is_admin() {
            return Err(WorkflowError::forbidden(
                &user.id,
                format!("cannot list papers of requisitioner '{}'", requisitioner),
            ));
        }
        Ok(self.store.list_papers_for_requisitioner(requisitioner).await?)
    }

    /// The full audit trail of a paper
    pub async fn audit_trail(
        &self,
        auth: &AuthContext,
        paper_id: &PaperId,
    ) -> WorkflowResult<Vec<AuditEntry>> {
        Ok(self.get_paper(auth, paper_id).await?.audit)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn load(&self, paper_id: &PaperId) -> WorkflowResult<ConceptPaper> {
        self.store
            .get_paper(paper_id)
            .await?
            .ok_or_else(|| WorkflowError::PaperNotFound(paper_id.clone()))
    }

    fn authorize_stage(&self, user: &User, paper: &ConceptPaper, order: u8) -> WorkflowResult<()> {
        let stage = paper.stage(order).ok_or_else(|| {
            WorkflowError::InvariantViolation(format!("paper {} has no stage {}", paper.id, order))
        })?;
        self.policy.authorize_mutation(user, stage)
    }

    /// Run one serialized transition on the paper owning `stage_id`.
    async fn transition<F>(
        &self,
        stage_id: &StageId,
        operation: &'static str,
        apply: F,
    ) -> WorkflowResult<ConceptPaper>
    where
        F: FnOnce(&mut ConceptPaper, u8, DateTime<Utc>) -> WorkflowResult<Vec<NotificationEvent>>,
    {
        let paper_id = self
            .store
            .find_paper_by_stage(stage_id)
            .await?
            .map(|p| p.id)
            .ok_or_else(|| WorkflowError::StageNotFound(stage_id.clone()))?;

        let (saved, events) = {
            let _guard = self.locks.lock(&paper_id).await;

            // Re-read under the lock; the copy found above may be stale
            let mut paper = self.load(&paper_id).await?;
            let expected_version = paper.version;
            let order = paper.stage_order_of(stage_id)?;
            let now = self.clock.now();

            let events = apply(&mut paper, order, now).map_err(|e| {
                tracing::debug!(
                    paper_id = %paper_id,
                    stage_order = order,
                    operation,
                    error = %e,
                    "Transition rejected"
                );
                e
            })?;

            if let Err(e) = paper.check_invariants() {
                tracing::error!(
                    paper_id = %paper_id,
                    stage_order = order,
                    operation,
                    error = %e,
                    "Transition would break paper invariants, nothing persisted"
                );
                return Err(e);
            }

            let saved = self
                .store
                .update_paper(paper, expected_version)
                .await
                .map_err(|e| match e {
                    StorageError::Conflict(message) => WorkflowError::StateConflict(message),
                    other => WorkflowError::Storage(other),
                })?;

            tracing::info!(
                paper_id = %saved.id,
                tracking_number = %saved.tracking_number,
                stage_order = order,
                operation,
                status = %saved.status,
                current_stage = ?saved.current_stage_order,
                "Stage transition applied"
            );
            (saved, events)
        };

        self.dispatcher.dispatch(events).await;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::InMemoryPaperStore;
    use crate::notify::{MemoryNotifier, RetryPolicy};
    use chrono::{Duration, TimeZone};

    struct Harness {
        engine: WorkflowEngine,
        notifier: Arc<MemoryNotifier>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let engine = WorkflowEngine::new(
            Arc::new(InMemoryPaperStore::new()),
            NotificationDispatcher::inline(notifier.clone(), RetryPolicy::immediate(1)),
        )
        .with_clock(clock.clone());
        Harness {
            engine,
            notifier,
            clock,
        }
    }

    fn as_user(id: &str, role: Role) -> AuthContext {
        AuthContext::user(User::new(id, id, role))
    }

    async fn submit(h: &Harness) -> ConceptPaper {
        h.engine
            .submit(
                &as_user("req-1", Role::Requisitioner),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_assigns_tracking_numbers() {
        let h = harness();
        let first = submit(&h).await;
        let second = submit(&h).await;
        assert_eq!(first.tracking_number.0, "CP-2026-0001");
        assert_eq!(second.tracking_number.0, "CP-2026-0002");
        assert_eq!(first.version, 1);
    }

    #[tokio::test]
    async fn test_submit_requires_authentication() {
        let h = harness();
        let err = h
            .engine
            .submit(
                &AuthContext::anonymous(),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_deadline_option() {
        let h = harness();
        let err = h
            .engine
            .submit(
                &as_user("req-1", Role::Requisitioner),
                PaperDraft::new("Biology", "Field trip", "3_fortnights"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownDeadlineOption(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_submit_with_unrepresentable_deadline_is_rejected() {
        let h = harness();
        h.clock.set(DateTime::<Utc>::MAX_UTC - Duration::days(1));

        let err = h
            .engine
            .submit(
                &as_user("req-1", Role::Requisitioner),
                PaperDraft::new("Biology", "Field trip", "1_week"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation { ref field, .. } if field == "deadline_option"
        ));
        assert!(h.engine.store().list_papers().await.unwrap().is_empty());
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_stage_is_not_found() {
        let h = harness();
        let err = h
            .engine
            .approve(&as_user("sps-1", Role::Sps), &StageId::new("missing"), "sig", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StageNotFound(_)));
    }

    #[tokio::test]
    async fn test_forbidden_transition_persists_nothing() {
        let h = harness();
        let paper = submit(&h).await;
        let stage_id = paper.stage(1).unwrap().id.clone();

        let err = h
            .engine
            .approve(&as_user("aud-1", Role::Auditor), &stage_id, "sig", None)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);

        let reloaded = h.engine.store().get_paper(&paper.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, 1);
        assert_eq!(reloaded.current_stage_order, Some(1));
    }

    #[tokio::test]
    async fn test_read_access() {
        let h = harness();
        let paper = submit(&h).await;

        assert!(h
            .engine
            .get_paper(&as_user("req-1", Role::Requisitioner), &paper.id)
            .await
            .is_ok());
        assert!(h
            .engine
            .get_paper(&as_user("acc-1", Role::Accounting), &paper.id)
            .await
            .is_ok());
        let err = h
            .engine
            .get_paper(&as_user("req-2", Role::Requisitioner), &paper.id)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert!(matches!(
            h.engine
                .get_paper(&as_user("adm", Role::Admin), &PaperId::new("nope"))
                .await,
            Err(WorkflowError::PaperNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overdue_status_follows_clock() {
        let h = harness();
        let paper = submit(&h).await;
        let auth = as_user("req-1", Role::Requisitioner);

        let status = h.engine.overdue_status(&auth, &paper.id).await.unwrap();
        assert!(!status.stage_overdue);
        assert!(!status.paper_overdue);

        h.clock.advance(Duration::days(1) + Duration::minutes(1));
        let status = h.engine.overdue_status(&auth, &paper.id).await.unwrap();
        assert!(status.stage_overdue);
        assert!(!status.paper_overdue);

        h.clock.advance(Duration::days(6));
        let status = h.engine.overdue_status(&auth, &paper.id).await.unwrap();
        assert!(status.paper_overdue);
    }

    #[tokio::test]
    async fn test_papers_awaiting_sorted_by_stage_deadline() {
        let h = harness();
        let first = submit(&h).await;
        h.clock.advance(Duration::hours(2));
        let second = submit(&h).await;

        let sps = as_user("sps-1", Role::Sps);
        let awaiting = h.engine.papers_awaiting(&sps).await.unwrap();
        let ids: Vec<_> = awaiting.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

        assert!(h
            .engine
            .papers_awaiting(&as_user("vp-1", Role::VpAcad))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_papers_for_requisitioner_scoping() {
        let h = harness();
        submit(&h).await;
        let own = h
            .engine
            .papers_for_requisitioner(&as_user("req-1", Role::Requisitioner), &UserId::new("req-1"))
            .await
            .unwrap();
        assert_eq!(own.len(), 1);

        assert!(h
            .engine
            .papers_for_requisitioner(&as_user("req-2", Role::Requisitioner), &UserId::new("req-1"))
            .await
            .is_err());
        assert_eq!(
            h.engine
                .papers_for_requisitioner(&as_user("adm", Role::Admin), &UserId::new("req-1"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_submit_notifies_first_stage_owner() {
        let h = harness();
        submit(&h).await;
        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), NotificationKind::StageAssigned);
        assert_eq!(sent[0].recipients(), vec![Recipient::Role(Role::Sps)]);
    }
}
