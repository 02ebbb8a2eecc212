//! Audit trail: the ordered history of every transition on a paper
//!
//! Papers are never deleted in normal operation; the trail travels with
//! the paper so the full approval history can be reconstructed.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submitted,
    StageActivated,
    StageApproved,
    StageReturned,
    StageReassigned,
    PaperCompleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::StageActivated => "stage_activated",
            Self::StageApproved => "stage_approved",
            Self::StageReturned => "stage_returned",
            Self::StageReassigned => "stage_reassigned",
            Self::PaperCompleted => "paper_completed",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a paper's audit trail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Dense, starting at 0
    pub sequence: u64,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_order: Option<u8>,
    /// `None` for system-driven entries such as stage activation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn involves_stage(&self, order: u8) -> bool {
        self.stage_order == Some(order)
    }
}
