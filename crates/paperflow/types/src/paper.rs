//! Concept papers: the aggregate root of the workflow
//!
//! A ConceptPaper owns its nine stages in a `Vec` indexed by
//! `stage_order - 1`. The current stage is held as an order, so moving
//! forward or back is `order + 1` / `order - 1` on the same vector and the
//! boundaries (returning stage 1, approving stage 9) are explicit checks.

use crate::{
    stage_definitions, AuditAction, AuditEntry, DeadlineOption, PaperId, StageId, StageStatus,
    TrackingNumber, User, UserId, WorkflowError, WorkflowResult, WorkflowStage, FINAL_STAGE,
    STAGE_COUNT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Enumerations ─────────────────────────────────────────────────────

/// How pressing the request is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NatureOfRequest {
    #[default]
    Regular,
    Urgent,
    Emergency,
}

impl std::str::FromStr for NatureOfRequest {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "urgent" => Ok(Self::Urgent),
            "emergency" => Ok(Self::Emergency),
            other => Err(WorkflowError::validation(
                "nature_of_request",
                format!("'{}' is not one of regular, urgent, emergency", other),
            )),
        }
    }
}

/// Overall status of a paper
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    /// Submitted, first stage not yet approved
    #[default]
    Pending,
    InProgress,
    Completed,
    /// The last transition was a return
    Returned,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Submission input ─────────────────────────────────────────────────

/// What a requisitioner submits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDraft {
    pub department: String,
    pub title: String,
    pub nature_of_request: NatureOfRequest,
    pub students_involved: bool,
    /// Key into the deadline catalog
    pub deadline_option: String,
}

impl PaperDraft {
    pub fn new(
        department: impl Into<String>,
        title: impl Into<String>,
        deadline_option: impl Into<String>,
    ) -> Self {
        Self {
            department: department.into(),
            title: title.into(),
            nature_of_request: NatureOfRequest::Regular,
            students_involved: false,
            deadline_option: deadline_option.into(),
        }
    }

    pub fn with_nature(mut self, nature: NatureOfRequest) -> Self {
        self.nature_of_request = nature;
        self
    }

    pub fn with_students_involved(mut self, involved: bool) -> Self {
        self.students_involved = involved;
        self
    }

    pub fn validate(&self) -> WorkflowResult<()> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::validation("title", "must not be blank"));
        }
        if self.department.trim().is_empty() {
            return Err(WorkflowError::validation("department", "must not be blank"));
        }
        if self.deadline_option.trim().is_empty() {
            return Err(WorkflowError::validation(
                "deadline_option",
                "must not be blank",
            ));
        }
        Ok(())
    }
}

// ── Concept Paper ────────────────────────────────────────────────────

/// A concept paper and its stages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConceptPaper {
    pub id: PaperId,
    pub tracking_number: TrackingNumber,
    pub requisitioner: UserId,
    pub department: String,
    pub title: String,
    pub nature_of_request: NatureOfRequest,
    pub students_involved: bool,
    pub submitted_at: DateTime<Utc>,
    /// `submitted_at` plus the chosen deadline option
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_date: Option<DateTime<Utc>>,
    pub status: PaperStatus,
    /// Order of the current stage; `None` before activation and once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage_order: Option<u8>,
    /// Set exactly once, when the final stage is approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Exactly nine, index `i` holds stage order `i + 1`
    pub stages: Vec<WorkflowStage>,
    pub audit: Vec<AuditEntry>,
    /// Bumped by the store on every successful write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ConceptPaper {
    /// Create a submitted paper with all nine stages pending.
    ///
    /// No stage is active yet; the stage engine activates stage 1. Fails
    /// when the deadline option lands outside the representable range.
    pub fn new(
        draft: PaperDraft,
        requisitioner: &User,
        tracking_number: TrackingNumber,
        deadline: &DeadlineOption,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        let deadline_date = deadline.deadline_from(now)?;
        let id = PaperId::generate();
        let stages = stage_definitions()
            .iter()
            .map(|def| WorkflowStage::pending(id.clone(), def))
            .collect();

        let mut paper = Self {
            id,
            tracking_number,
            requisitioner: requisitioner.id.clone(),
            department: draft.department,
            title: draft.title,
            nature_of_request: draft.nature_of_request,
            students_involved: draft.students_involved,
            submitted_at: now,
            deadline_date: Some(deadline_date),
            status: PaperStatus::Pending,
            current_stage_order: None,
            completed_at: None,
            stages,
            audit: Vec::new(),
            version: 0,
            updated_at: now,
        };
        paper.record(
            AuditAction::Submitted,
            None,
            Some(requisitioner.id.clone()),
            Some(format!("deadline option '{}'", deadline.key)),
            now,
        );
        Ok(paper)
    }

    // ── Stage access ─────────────────────────────────────────────────

    pub fn stage(&self, order: u8) -> Option<&WorkflowStage> {
        self.stages.get(usize::from(order).checked_sub(1)?)
    }

    pub fn stage_mut(&mut self, order: u8) -> Option<&mut WorkflowStage> {
        self.stages.get_mut(usize::from(order).checked_sub(1)?)
    }

    pub fn stage_by_id(&self, id: &StageId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| &s.id == id)
    }

    /// Order of the stage with the given id
    pub fn stage_order_of(&self, id: &StageId) -> WorkflowResult<u8> {
        self.stage_by_id(id)
            .map(|s| s.stage_order)
            .ok_or_else(|| WorkflowError::StageNotFound(id.clone()))
    }

    pub fn current_stage(&self) -> Option<&WorkflowStage> {
        self.current_stage_order.and_then(|order| self.stage(order))
    }

    /// Whether `order` is the current stage and still open
    pub fn is_actionable(&self, order: u8) -> bool {
        self.current_stage_order == Some(order)
            && self.stage(order).map(|s| s.is_open()).unwrap_or(false)
    }

    // ── Status queries ───────────────────────────────────────────────

    pub fn is_completed(&self) -> bool {
        self.status == PaperStatus::Completed
    }

    /// Not completed and at or past the overall deadline
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed() && self.deadline_date.map(|d| d <= now).unwrap_or(false)
    }

    pub fn overdue_status(&self, now: DateTime<Utc>) -> OverdueStatus {
        let current = self.current_stage();
        OverdueStatus {
            current_stage_order: self.current_stage_order,
            stage_overdue: current.map(|s| s.is_overdue(now)).unwrap_or(false),
            stage_deadline: current.and_then(|s| s.deadline),
            paper_overdue: self.is_past_deadline(now),
            paper_deadline: self.deadline_date,
        }
    }

    // ── Audit ────────────────────────────────────────────────────────

    pub fn record(
        &mut self,
        action: AuditAction,
        stage_order: Option<u8>,
        actor: Option<UserId>,
        remarks: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.audit.push(AuditEntry {
            sequence: self.audit.len() as u64,
            action,
            stage_order,
            actor,
            remarks,
            at,
        });
        self.updated_at = at;
    }

    pub fn audit_for_stage(&self, order: u8) -> Vec<&AuditEntry> {
        self.audit.iter().filter(|e| e.involves_stage(order)).collect()
    }

    // ── Invariants ───────────────────────────────────────────────────

    /// Verify the structural invariants of the aggregate.
    pub fn check_invariants(&self) -> WorkflowResult<()> {
        let violation = |msg: String| Err(WorkflowError::InvariantViolation(msg));

        if self.stages.len() != STAGE_COUNT {
            return violation(format!(
                "paper {} has {} stages, expected {}",
                self.tracking_number,
                self.stages.len(),
                STAGE_COUNT
            ));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            if usize::from(stage.stage_order) != index + 1 {
                return violation(format!(
                    "stage at position {} has order {}",
                    index, stage.stage_order
                ));
            }
            if stage.concept_paper_id != self.id {
                return violation(format!(
                    "stage {} belongs to paper {}",
                    stage.id, stage.concept_paper_id
                ));
            }
        }

        let final_completed = self
            .stage(FINAL_STAGE)
            .map(|s| s.status == StageStatus::Completed)
            .unwrap_or(false);
        let completed = self.status == PaperStatus::Completed;
        if completed != self.completed_at.is_some() || completed != final_completed {
            return violation(format!(
                "completion mismatch: status={}, completed_at set={}, final stage completed={}",
                self.status,
                self.completed_at.is_some(),
                final_completed
            ));
        }

        let in_progress = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::InProgress)
            .count();
        if in_progress > 1 {
            return violation(format!("{} stages are in progress", in_progress));
        }

        match (completed, self.current_stage_order) {
            (true, None) => {
                if let Some(open) = self.stages.iter().find(|s| s.status != StageStatus::Completed)
                {
                    return violation(format!(
                        "paper completed but stage {} is {}",
                        open.stage_order, open.status
                    ));
                }
            }
            (true, Some(order)) => {
                return violation(format!("completed paper still points at stage {}", order));
            }
            (false, None) => {
                return violation("open paper has no current stage".into());
            }
            (false, Some(order)) => {
                if !self.is_actionable(order) {
                    return violation(format!("current stage {} is not open", order));
                }
                for stage in &self.stages {
                    let ok = if stage.stage_order < order {
                        stage.status == StageStatus::Completed
                    } else if stage.stage_order > order {
                        matches!(stage.status, StageStatus::Pending | StageStatus::Returned)
                    } else {
                        true
                    };
                    if !ok {
                        return violation(format!(
                            "stage {} is {} while stage {} is current",
                            stage.stage_order, stage.status, order
                        ));
                    }
                }
            }
        }

        for (index, entry) in self.audit.iter().enumerate() {
            if entry.sequence != index as u64 {
                return violation(format!(
                    "audit entry at {} has sequence {}",
                    index, entry.sequence
                ));
            }
        }

        Ok(())
    }
}

/// Deadline standing of a paper and its current stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueStatus {
    pub current_stage_order: Option<u8>,
    pub stage_overdue: bool,
    pub stage_deadline: Option<DateTime<Utc>>,
    pub paper_overdue: bool,
    pub paper_deadline: Option<DateTime<Utc>>,
}
