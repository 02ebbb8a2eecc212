//! Concept Paper Domain Types
//!
//! A concept paper is a funding request that travels through a fixed,
//! nine-stage sequential approval chain. Each stage is owned by a role,
//! carries its own deadline, and must be approved or returned before the
//! next stage becomes current.
//!
//! # Key Concepts
//!
//! - **StageDefinition**: one row of the static, ordered stage table
//!   (name, owning role, maximum days).
//! - **ConceptPaper**: the aggregate root. It owns exactly nine
//!   [`WorkflowStage`]s stored in order, so neighbour lookup is an index
//!   operation rather than a query.
//! - **WorkflowStage**: one stage instance for one paper, with status,
//!   assignment, deadline and remarks.
//! - **DeadlineOption**: the submission-time choice that fixes the paper's
//!   overall deadline.
//! - **NotificationEvent**: typed events handed to notification dispatch.
//! - **AuditEntry**: append-only history of every transition on a paper.
//!
//! # Design Principles
//!
//! 1. Roles are a closed enum; illegal roles do not type-check.
//! 2. Papers are mutated only through the stage engine.
//! 3. Every transition is recorded in the paper's audit trail.

#![deny(unsafe_code)]

mod audit;
mod deadline;
mod errors;
mod events;
mod ids;
mod paper;
mod role;
mod stage;
mod stage_table;
mod user;

pub use audit::*;
pub use deadline::*;
pub use errors::*;
pub use events::*;
pub use ids::*;
pub use paper::*;
pub use role::*;
pub use stage::*;
pub use stage_table::*;
pub use user::*;
