//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use paperflow_engine::*;
use paperflow_types::*;
use std::sync::Arc;

pub struct TestEnv {
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<InMemoryPaperStore>,
    pub dedup: Arc<InMemoryDedupStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub clock: Arc<ManualClock>,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPaperStore::new());
        let dedup = Arc::new(InMemoryDedupStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = WorkflowEngine::new(
            store.clone(),
            NotificationDispatcher::inline(notifier.clone(), RetryPolicy::immediate(1)),
        )
        .with_clock(clock.clone());
        Self {
            engine: Arc::new(engine),
            store,
            dedup,
            notifier,
            clock,
        }
    }

    pub fn scanner(&self) -> DeadlineScanner {
        DeadlineScanner::new(self.store.clone(), self.dedup.clone(), self.notifier.clone())
            .with_clock(self.clock.clone())
    }

    pub async fn submit(&self) -> ConceptPaper {
        self.engine
            .submit(
                &requisitioner(),
                PaperDraft::new("Biology", "Coastal field study", "1_week"),
            )
            .await
            .unwrap()
    }

    pub async fn paper(&self, id: &PaperId) -> ConceptPaper {
        self.store.get_paper(id).await.unwrap().unwrap()
    }

    /// Approve the current stage as its owning role
    pub async fn approve_current(&self, paper: &ConceptPaper) -> ConceptPaper {
        let stage = paper.current_stage().unwrap();
        self.engine
            .approve(&owner_of(stage.stage_order), &stage.id, "signed", None)
            .await
            .unwrap()
    }

    pub async fn sent_kinds(&self) -> Vec<NotificationKind> {
        self.notifier.sent().await.iter().map(|e| e.kind()).collect()
    }
}

pub fn requisitioner() -> AuthContext {
    AuthContext::user(User::new("req-1", "Rosa Requisitioner", Role::Requisitioner))
}

pub fn admin() -> AuthContext {
    AuthContext::user(User::new("adm-1", "Ada Admin", Role::Admin))
}

pub fn as_role(role: Role) -> AuthContext {
    AuthContext::user(User::new(format!("{}-1", role), role.to_string(), role))
}

/// A user holding the role that owns stage `order`
pub fn owner_of(order: u8) -> AuthContext {
    as_role(stage_definition(order).unwrap().role)
}
