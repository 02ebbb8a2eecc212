//! Concept Paper Stage Engine
//!
//! The engine moves concept papers through the nine-stage approval chain.
//! Every user action (approve, return, reassign) runs as one serialized
//! operation per paper: load, authorize, transition, check invariants,
//! persist, then hand notification events to dispatch.
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] composes specialized components:
//!
//! - [`AuthorizationPolicy`]: decides who may act on or read what
//! - [`StageStateMachine`]: pure transitions on a [`ConceptPaper`]
//! - [`PaperStore`]: persistence seam, [`InMemoryPaperStore`] for tests and development
//! - [`PaperLocks`]: per-paper serialization of transitions
//! - [`NotificationDispatcher`]: fire-and-forget delivery through a [`RetryingNotifier`]
//!
//! The [`DeadlineScanner`] runs beside the engine. It only reads papers,
//! emits overdue and deadline notifications, and guards deadline
//! notifications with a [`DedupStore`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use paperflow_engine::*;
//! use paperflow_types::*;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let notifier = Arc::new(MemoryNotifier::new());
//!     let engine = WorkflowEngine::new(
//!         Arc::new(InMemoryPaperStore::new()),
//!         NotificationDispatcher::inline(notifier.clone(), RetryPolicy::immediate(1)),
//!     );
//!
//!     let requisitioner = AuthContext::user(User::new("req-1", "Rosa", Role::Requisitioner));
//!     let paper = engine
//!         .submit(&requisitioner, PaperDraft::new("Biology", "Field trip", "1_week"))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(paper.current_stage().unwrap().stage_name, "SPS Review");
//!     assert_eq!(notifier.sent().await.len(), 1);
//! });
//! ```

#![deny(unsafe_code)]

pub mod authorization;
pub mod clock;
pub mod dedup;
pub mod engine;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod scanner;
pub mod state_machine;
pub mod store;

pub use authorization::AuthorizationPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DedupKey, DedupStore, InMemoryDedupStore};
pub use engine::WorkflowEngine;
pub use locks::{PaperLockGuard, PaperLocks};
pub use memory::InMemoryPaperStore;
pub use notify::{
    DispatchMode, MemoryNotifier, NotificationDispatcher, Notifier, NotifyError, RetryPolicy,
    RetryingNotifier, TracingNotifier,
};
pub use scanner::{
    DeadlineScanner, ScanReport, SweepReport, DEFAULT_DEDUP_TTL_DAYS, DEFAULT_MAX_IN_FLIGHT,
};
pub use state_machine::StageStateMachine;
pub use store::{PaperStore, StageRecord};
