//! Notification events handed to dispatch
//!
//! Each event carries the snapshot a mail or chat template needs to render
//! a human-readable message without going back to storage.

use crate::{
    ConceptPaper, PaperId, PaperStatus, Role, StageId, StageStatus, TrackingNumber, UserId,
    WorkflowStage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a notification is addressed to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    /// Everyone holding the role
    Role(Role),
}

impl Recipient {
    /// The assigned user when set, otherwise the owning role
    pub fn for_stage(stage: &WorkflowStage) -> Self {
        match &stage.assigned_user {
            Some(user) => Recipient::User(user.clone()),
            None => Recipient::Role(stage.assigned_role),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::User(id) => write!(f, "user:{}", id),
            Recipient::Role(role) => write!(f, "role:{}", role),
        }
    }
}

/// Paper fields needed to render a notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaperSnapshot {
    pub id: PaperId,
    pub tracking_number: TrackingNumber,
    pub title: String,
    pub department: String,
    pub requisitioner: UserId,
    pub status: PaperStatus,
    pub deadline_date: Option<DateTime<Utc>>,
}

impl From<&ConceptPaper> for PaperSnapshot {
    fn from(paper: &ConceptPaper) -> Self {
        Self {
            id: paper.id.clone(),
            tracking_number: paper.tracking_number.clone(),
            title: paper.title.clone(),
            department: paper.department.clone(),
            requisitioner: paper.requisitioner.clone(),
            status: paper.status,
            deadline_date: paper.deadline_date,
        }
    }
}

/// Stage fields needed to render a notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub id: StageId,
    pub stage_order: u8,
    pub stage_name: String,
    pub assigned_role: Role,
    pub assigned_user: Option<UserId>,
    pub status: StageStatus,
    pub deadline: Option<DateTime<Utc>>,
}

impl From<&WorkflowStage> for StageSnapshot {
    fn from(stage: &WorkflowStage) -> Self {
        Self {
            id: stage.id.clone(),
            stage_order: stage.stage_order,
            stage_name: stage.stage_name.clone(),
            assigned_role: stage.assigned_role,
            assigned_user: stage.assigned_user.clone(),
            status: stage.status,
            deadline: stage.deadline,
        }
    }
}

/// Discriminant of [`NotificationEvent`], also used as the event half of
/// notification dedup keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StageAssigned,
    StageReassigned,
    StageOverdue,
    PaperDeadlineReached,
    PaperReturned,
    PaperCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageAssigned => "stage_assigned",
            Self::StageReassigned => "stage_reassigned",
            Self::StageOverdue => "stage_overdue",
            Self::PaperDeadlineReached => "deadline_notification",
            Self::PaperReturned => "paper_returned",
            Self::PaperCompleted => "paper_completed",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events produced by transitions and by the deadline scanner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A stage became current and awaits its owner
    StageAssigned {
        paper: PaperSnapshot,
        stage: StageSnapshot,
        recipient: Recipient,
    },
    /// An administrator handed a stage to a different user
    StageReassigned {
        paper: PaperSnapshot,
        stage: StageSnapshot,
        new_assignee: UserId,
        previous_assignee: Option<UserId>,
    },
    /// An open stage passed its deadline
    StageOverdue {
        paper: PaperSnapshot,
        stage: StageSnapshot,
        recipient: Recipient,
    },
    /// The paper's overall deadline passed before completion
    PaperDeadlineReached {
        paper: PaperSnapshot,
        recipient: Recipient,
    },
    /// A stage was returned to its predecessor
    PaperReturned {
        paper: PaperSnapshot,
        returned_stage: StageSnapshot,
        reactivated_stage: StageSnapshot,
        remarks: String,
        recipients: Vec<Recipient>,
    },
    /// The final stage was approved
    PaperCompleted {
        paper: PaperSnapshot,
        recipient: Recipient,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::StageAssigned { .. } => NotificationKind::StageAssigned,
            Self::StageReassigned { .. } => NotificationKind::StageReassigned,
            Self::StageOverdue { .. } => NotificationKind::StageOverdue,
            Self::PaperDeadlineReached { .. } => NotificationKind::PaperDeadlineReached,
            Self::PaperReturned { .. } => NotificationKind::PaperReturned,
            Self::PaperCompleted { .. } => NotificationKind::PaperCompleted,
        }
    }

    pub fn paper(&self) -> &PaperSnapshot {
        match self {
            Self::StageAssigned { paper, .. }
            | Self::StageReassigned { paper, .. }
            | Self::StageOverdue { paper, .. }
            | Self::PaperDeadlineReached { paper, .. }
            | Self::PaperReturned { paper, .. }
            | Self::PaperCompleted { paper, .. } => paper,
        }
    }

    pub fn paper_id(&self) -> &PaperId {
        &self.paper().id
    }

    /// Everyone the event should reach
    pub fn recipients(&self) -> Vec<Recipient> {
        match self {
            Self::StageAssigned { recipient, .. }
            | Self::StageOverdue { recipient, .. }
            | Self::PaperDeadlineReached { recipient, .. }
            | Self::PaperCompleted { recipient, .. } => vec![recipient.clone()],
            Self::StageReassigned { new_assignee, .. } => {
                vec![Recipient::User(new_assignee.clone())]
            }
            Self::PaperReturned { recipients, .. } => recipients.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_definition;

    #[test]
    fn test_recipient_prefers_assigned_user() {
        let mut stage =
            WorkflowStage::pending(PaperId::new("p"), stage_definition(3).unwrap());
        assert_eq!(Recipient::for_stage(&stage), Recipient::Role(Role::Auditor));

        stage.assigned_user = Some(UserId::new("aud-7"));
        assert_eq!(
            Recipient::for_stage(&stage),
            Recipient::User(UserId::new("aud-7"))
        );
    }

    #[test]
    fn test_deadline_kind_matches_dedup_key_name() {
        assert_eq!(
            NotificationKind::PaperDeadlineReached.as_str(),
            "deadline_notification"
        );
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let stage = WorkflowStage::pending(PaperId::new("p"), stage_definition(1).unwrap());
        let event = NotificationEvent::StageOverdue {
            paper: PaperSnapshot {
                id: PaperId::new("p"),
                tracking_number: TrackingNumber::new("CP-2026-0001"),
                title: "Field trip".into(),
                department: "Biology".into(),
                requisitioner: UserId::new("req"),
                status: PaperStatus::Pending,
                deadline_date: None,
            },
            stage: StageSnapshot::from(&stage),
            recipient: Recipient::for_stage(&stage),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stage_overdue");
        assert_eq!(json["recipient"]["type"], "role");
        assert_eq!(event.kind(), NotificationKind::StageOverdue);
        assert_eq!(event.paper_id(), &PaperId::new("p"));
    }
}
