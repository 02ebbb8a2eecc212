//! Workflow stages: one stage of the approval chain for one paper
//!
//! A stage is created `Pending` with no start time or deadline. Activation
//! stamps `started_at` and computes `deadline = started_at + max_days`.
//! Approval and return close the stage; a later activation (after a return
//! rewinds onto it, or after its predecessor is approved again) resets it.

use crate::{stage_definition, PaperId, Role, StageDefinition, StageId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet activated
    #[default]
    Pending,
    /// Active and awaiting its owner
    InProgress,
    /// Approved
    Completed,
    /// Closed by a return to the previous stage
    Returned,
}

impl StageStatus {
    /// Statuses a stage may be acted on from
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage instance, exclusively owned by its concept paper
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: StageId,
    pub concept_paper_id: PaperId,
    /// 1..=9, matches a row of the stage table
    pub stage_order: u8,
    pub stage_name: String,
    pub assigned_role: Role,
    /// Overrides role-based assignment for this instance only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user: Option<UserId>,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Required on return, optional on approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    /// Opaque signature artifact captured on approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Who approved or returned the stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acted_by: Option<UserId>,
}

impl WorkflowStage {
    /// Create a pending stage from a row of the stage table
    pub fn pending(concept_paper_id: PaperId, definition: &StageDefinition) -> Self {
        Self {
            id: StageId::generate(),
            concept_paper_id,
            stage_order: definition.order,
            stage_name: definition.name.to_string(),
            assigned_role: definition.role,
            assigned_user: None,
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            deadline: None,
            remarks: None,
            signature: None,
            acted_by: None,
        }
    }

    /// The stage table row this stage was created from
    pub fn definition(&self) -> Option<&'static StageDefinition> {
        stage_definition(self.stage_order)
    }

    /// Make the stage active with a fresh deadline.
    ///
    /// Any previous outcome (completion, return, remarks, signature) is
    /// discarded.
    pub fn activate(&mut self, max_days: u32, now: DateTime<Utc>) {
        self.status = StageStatus::InProgress;
        self.started_at = Some(now);
        self.deadline = Some(now + Duration::days(i64::from(max_days)));
        self.completed_at = None;
        self.remarks = None;
        self.signature = None;
        self.acted_by = None;
    }

    /// Close the stage as approved
    pub fn complete(
        &mut self,
        actor: UserId,
        signature: String,
        remarks: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = StageStatus::Completed;
        self.completed_at = Some(now);
        self.signature = Some(signature);
        self.remarks = remarks;
        self.acted_by = Some(actor);
    }

    /// Close the stage as returned to its predecessor
    pub fn mark_returned(&mut self, actor: UserId, remarks: String, now: DateTime<Utc>) {
        self.status = StageStatus::Returned;
        self.completed_at = Some(now);
        self.remarks = Some(remarks);
        self.signature = None;
        self.acted_by = Some(actor);
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Open with a deadline strictly in the past
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.deadline.map(|d| d < now).unwrap_or(false)
    }

    /// Whole days until the deadline (negative once overdue)
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline
            .map(|d| d.signed_duration_since(now).num_days())
    }
}
