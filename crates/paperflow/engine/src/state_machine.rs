//! Stage state machine: the transitions of a concept paper
//!
//! Transitions are pure. They mutate the paper in memory, append audit
//! entries, and return the notification events the change produces. They
//! never authorize, persist or dispatch; the engine does that around them.
//!
//! Stages are addressed by order. Approve moves the current order up by
//! exactly one, Return moves it down by exactly one, and the two boundary
//! cases (return from stage 1, approve stage 9) are explicit branches.

use chrono::{DateTime, Utc};
use paperflow_types::*;

/// Applies stage transitions to a [`ConceptPaper`]
#[derive(Clone, Debug, Default)]
pub struct StageStateMachine;

impl StageStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Activate the first stage of a freshly submitted paper.
    pub fn initialize(
        &self,
        paper: &mut ConceptPaper,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<NotificationEvent>> {
        if paper.current_stage_order.is_some() || paper.status != PaperStatus::Pending {
            return Err(WorkflowError::StateConflict(format!(
                "paper {} has already been started",
                paper.tracking_number
            )));
        }
        if let Some(started) = paper.stages.iter().find(|s| s.status != StageStatus::Pending) {
            return Err(WorkflowError::StateConflict(format!(
                "stage {} of paper {} is already {}",
                started.stage_order, paper.tracking_number, started.status
            )));
        }

        let stage = self.activate(paper, FIRST_STAGE, now)?;
        Ok(vec![Self::assigned_event(paper, &stage)])
    }

    /// Approve the stage at `order`.
    ///
    /// Stage `order + 1` becomes current, or the paper completes when
    /// `order` is the final stage.
    pub fn approve(
        &self,
        paper: &mut ConceptPaper,
        order: u8,
        actor: &User,
        signature: &str,
        remarks: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<NotificationEvent>> {
        if signature.trim().is_empty() {
            return Err(WorkflowError::validation(
                "signature",
                "a signature is required to approve",
            ));
        }
        let remarks = remarks.filter(|r| !r.trim().is_empty());
        self.ensure_actionable(paper, order)?;

        self.stage_mut(paper, order)?.complete(
            actor.id.clone(),
            signature.to_string(),
            remarks.clone(),
            now,
        );
        paper.record(
            AuditAction::StageApproved,
            Some(order),
            Some(actor.id.clone()),
            remarks,
            now,
        );

        if order >= FINAL_STAGE {
            paper.status = PaperStatus::Completed;
            paper.current_stage_order = None;
            paper.completed_at = Some(now);
            paper.record(
                AuditAction::PaperCompleted,
                Some(order),
                Some(actor.id.clone()),
                None,
                now,
            );
            return Ok(vec![NotificationEvent::PaperCompleted {
                paper: PaperSnapshot::from(&*paper),
                recipient: Recipient::User(paper.requisitioner.clone()),
            }]);
        }

        let next = self.activate(paper, order + 1, now)?;
        paper.status = PaperStatus::InProgress;
        Ok(vec![Self::assigned_event(paper, &next)])
    }

    /// Return the stage at `order` to its immediate predecessor.
    ///
    /// Stage `order` closes as returned and stage `order - 1` is reactivated
    /// with a fresh deadline. Stage 1 has no predecessor and cannot be
    /// returned.
    pub fn return_stage(
        &self,
        paper: &mut ConceptPaper,
        order: u8,
        actor: &User,
        remarks: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<NotificationEvent>> {
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(WorkflowError::validation(
                "remarks",
                "remarks are required to return a stage",
            ));
        }
        if order <= FIRST_STAGE {
            return Err(WorkflowError::validation(
                "stage_order",
                format!("stage {} has no previous stage to return to", order),
            ));
        }
        self.ensure_actionable(paper, order)?;

        self.stage_mut(paper, order)?
            .mark_returned(actor.id.clone(), remarks.to_string(), now);
        paper.record(
            AuditAction::StageReturned,
            Some(order),
            Some(actor.id.clone()),
            Some(remarks.to_string()),
            now,
        );

        let previous = self.activate(paper, order - 1, now)?;
        paper.status = PaperStatus::Returned;

        let returned = paper
            .stage(order)
            .map(StageSnapshot::from)
            .ok_or_else(|| missing_stage(paper, order))?;
        let reactivated_recipient = Recipient::for_stage(&previous);
        let mut recipients = vec![Recipient::User(paper.requisitioner.clone())];
        if !recipients.contains(&reactivated_recipient) {
            recipients.push(reactivated_recipient);
        }

        Ok(vec![
            Self::assigned_event(paper, &previous),
            NotificationEvent::PaperReturned {
                paper: PaperSnapshot::from(&*paper),
                returned_stage: returned,
                reactivated_stage: StageSnapshot::from(&previous),
                remarks: remarks.to_string(),
                recipients,
            },
        ])
    }

    /// Hand the stage at `order` to `assignee`. Status is unchanged.
    ///
    /// Only open stages can be reassigned, and the assignee must be an
    /// active holder of the stage's role.
    pub fn reassign(
        &self,
        paper: &mut ConceptPaper,
        order: u8,
        admin: &User,
        assignee: &User,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<NotificationEvent>> {
        let stage = paper.stage(order).ok_or_else(|| missing_stage(paper, order))?;
        if !stage.is_open() {
            return Err(WorkflowError::StateConflict(format!(
                "stage {} ({}) is {} and can no longer be reassigned",
                order, stage.stage_name, stage.status
            )));
        }
        if !assignee.is_active {
            return Err(WorkflowError::validation(
                "assigned_user",
                format!("user '{}' is inactive", assignee.id),
            ));
        }
        if assignee.role != stage.assigned_role {
            return Err(WorkflowError::validation(
                "assigned_user",
                format!(
                    "user '{}' has role '{}', stage {} requires '{}'",
                    assignee.id, assignee.role, order, stage.assigned_role
                ),
            ));
        }

        let stage = self.stage_mut(paper, order)?;
        let previous_assignee = stage.assigned_user.replace(assignee.id.clone());
        let snapshot = StageSnapshot::from(&*stage);
        paper.record(
            AuditAction::StageReassigned,
            Some(order),
            Some(admin.id.clone()),
            Some(match &previous_assignee {
                Some(previous) => format!("{} -> {}", previous, assignee.id),
                None => format!("role {} -> {}", snapshot.assigned_role, assignee.id),
            }),
            now,
        );

        Ok(vec![NotificationEvent::StageReassigned {
            paper: PaperSnapshot::from(&*paper),
            stage: snapshot,
            new_assignee: assignee.id.clone(),
            previous_assignee,
        }])
    }

    /// `order` must be the current stage and still open
    fn ensure_actionable(&self, paper: &ConceptPaper, order: u8) -> WorkflowResult<()> {
        let stage = paper.stage(order).ok_or_else(|| missing_stage(paper, order))?;
        if paper.is_actionable(order) {
            return Ok(());
        }
        let detail = match paper.current_stage_order {
            Some(current) => format!("the current stage is {}", current),
            None if paper.is_completed() => "the paper is completed".to_string(),
            None => "the paper has no current stage".to_string(),
        };
        Err(WorkflowError::StateConflict(format!(
            "stage {} ({}) of paper {} is {}; {}",
            order, stage.stage_name, paper.tracking_number, stage.status, detail
        )))
    }

    /// Make `order` the current stage with a fresh deadline
    fn activate(
        &self,
        paper: &mut ConceptPaper,
        order: u8,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowStage> {
        let stage = self.stage_mut(paper, order)?;
        let max_days = stage
            .definition()
            .map(|d| d.max_days)
            .ok_or_else(|| {
                WorkflowError::InvariantViolation(format!("no definition for stage {}", order))
            })?;
        stage.activate(max_days, now);
        let activated = stage.clone();

        paper.current_stage_order = Some(order);
        paper.record(AuditAction::StageActivated, Some(order), None, None, now);
        Ok(activated)
    }

    fn stage_mut<'a>(
        &self,
        paper: &'a mut ConceptPaper,
        order: u8,
    ) -> WorkflowResult<&'a mut WorkflowStage> {
        let missing = missing_stage(paper, order);
        paper.stage_mut(order).ok_or(missing)
    }

    fn assigned_event(paper: &ConceptPaper, stage: &WorkflowStage) -> NotificationEvent {
        NotificationEvent::StageAssigned {
            paper: PaperSnapshot::from(paper),
            stage: StageSnapshot::from(stage),
            recipient: Recipient::for_stage(stage),
        }
    }
}

fn missing_stage(paper: &ConceptPaper, order: u8) -> WorkflowError {
    WorkflowError::InvariantViolation(format!(
        "paper {} has no stage {}",
        paper.tracking_number, order
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn user(role: Role) -> User {
        User::new(format!("{}-1", role), role.to_string(), role)
    }

    fn started_paper() -> ConceptPaper {
        let requisitioner = User::new("req-1", "Rosa", Role::Requisitioner);
        let mut paper = ConceptPaper::new(
            PaperDraft::new("Biology", "Field trip", "1_week"),
            &requisitioner,
            TrackingNumber::from_sequence(2026, 1),
            DeadlineCatalog::standard().resolve("1_week").unwrap(),
            t0(),
        )
        .unwrap();
        StageStateMachine::new().initialize(&mut paper, t0()).unwrap();
        paper
    }

    fn approve(
        machine: &StageStateMachine,
        paper: &mut ConceptPaper,
        order: u8,
        at: DateTime<Utc>,
    ) {
        let role = stage_definition(order).unwrap().role;
        machine
            .approve(paper, order, &user(role), "signed", None, at)
            .unwrap();
    }

    #[test]
    fn test_initialize_activates_first_stage() {
        let paper = started_paper();
        let stage = paper.current_stage().unwrap();
        assert_eq!(stage.stage_order, 1);
        assert_eq!(stage.status, StageStatus::InProgress);
        assert_eq!(stage.deadline, Some(t0() + Duration::days(1)));
        assert_eq!(paper.status, PaperStatus::Pending);
        paper.check_invariants().unwrap();
    }

    #[test]
    fn test_initialize_twice_conflicts() {
        let mut paper = started_paper();
        assert!(matches!(
            StageStateMachine::new().initialize(&mut paper, t0()),
            Err(WorkflowError::StateConflict(_))
        ));
    }

    #[test]
    fn test_approve_advances_by_one() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        let later = t0() + Duration::hours(3);

        let events = machine
            .approve(&mut paper, 1, &user(Role::Sps), "sig", Some("fine".into()), later)
            .unwrap();

        assert_eq!(paper.stage(1).unwrap().status, StageStatus::Completed);
        assert_eq!(paper.stage(1).unwrap().signature.as_deref(), Some("sig"));
        let next = paper.current_stage().unwrap();
        assert_eq!(next.stage_order, 2);
        assert_eq!(next.status, StageStatus::InProgress);
        assert_eq!(next.deadline, Some(later + Duration::days(3)));
        assert_eq!(paper.status, PaperStatus::InProgress);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), NotificationKind::StageAssigned);
        assert_eq!(events[0].recipients(), vec![Recipient::Role(Role::VpAcad)]);
        paper.check_invariants().unwrap();
    }

    #[test]
    fn test_blank_signature_rejected() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        match machine.approve(&mut paper, 1, &user(Role::Sps), "  ", None, t0()) {
            Err(WorkflowError::Validation { field, .. }) => assert_eq!(field, "signature"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(paper.stage(1).unwrap().status, StageStatus::InProgress);
    }

    #[test]
    fn test_approving_a_pending_future_stage_conflicts() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        assert!(matches!(
            machine.approve(&mut paper, 3, &user(Role::Auditor), "sig", None, t0()),
            Err(WorkflowError::StateConflict(_))
        ));
    }

    #[test]
    fn test_return_rewinds_by_one() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        approve(&machine, &mut paper, 1, t0());
        let first_deadline = paper.stage(1).unwrap().deadline;

        let later = t0() + Duration::days(1);
        let events = machine
            .return_stage(&mut paper, 2, &user(Role::VpAcad), "missing budget breakdown", later)
            .unwrap();

        let returned = paper.stage(2).unwrap();
        assert_eq!(returned.status, StageStatus::Returned);
        assert_eq!(returned.remarks.as_deref(), Some("missing budget breakdown"));
        let reactivated = paper.current_stage().unwrap();
        assert_eq!(reactivated.stage_order, 1);
        assert_eq!(reactivated.status, StageStatus::InProgress);
        assert!(reactivated.completed_at.is_none());
        assert!(reactivated.signature.is_none());
        assert_ne!(reactivated.deadline, first_deadline);
        assert_eq!(reactivated.deadline, Some(later + Duration::days(1)));
        assert_eq!(paper.status, PaperStatus::Returned);
        paper.check_invariants().unwrap();

        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::StageAssigned, NotificationKind::PaperReturned]
        );
        assert_eq!(
            events[1].recipients(),
            vec![
                Recipient::User(UserId::new("req-1")),
                Recipient::Role(Role::Sps)
            ]
        );
    }

    #[test]
    fn test_return_from_first_stage_is_validation_error() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        match machine.return_stage(&mut paper, 1, &user(Role::Sps), "no", t0()) {
            Err(WorkflowError::Validation { field, .. }) => assert_eq!(field, "stage_order"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(paper.current_stage_order, Some(1));
    }

    #[test]
    fn test_return_requires_remarks() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        approve(&machine, &mut paper, 1, t0());
        match machine.return_stage(&mut paper, 2, &user(Role::VpAcad), "   ", t0()) {
            Err(WorkflowError::Validation { field, .. }) => assert_eq!(field, "remarks"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_full_run_completes_paper() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        for order in 1..FINAL_STAGE {
            approve(&machine, &mut paper, order, t0());
        }
        let events = machine
            .approve(&mut paper, 9, &user(Role::Accounting), "sig", None, t0())
            .unwrap();

        assert_eq!(paper.status, PaperStatus::Completed);
        assert_eq!(paper.completed_at, Some(t0()));
        assert!(paper.current_stage_order.is_none());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), NotificationKind::PaperCompleted);
        paper.check_invariants().unwrap();

        assert!(matches!(
            machine.approve(&mut paper, 9, &user(Role::Accounting), "sig", None, t0()),
            Err(WorkflowError::StateConflict(_))
        ));
    }

    #[test]
    fn test_returned_stage_is_reset_on_next_advance() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        approve(&machine, &mut paper, 1, t0());
        machine
            .return_stage(&mut paper, 2, &user(Role::VpAcad), "redo", t0())
            .unwrap();
        approve(&machine, &mut paper, 1, t0() + Duration::days(2));

        let stage = paper.current_stage().unwrap();
        assert_eq!(stage.stage_order, 2);
        assert_eq!(stage.status, StageStatus::InProgress);
        assert!(stage.remarks.is_none());
        assert_eq!(paper.status, PaperStatus::InProgress);
        paper.check_invariants().unwrap();
    }

    #[test]
    fn test_reassign_validates_assignee() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        let admin = user(Role::Admin);

        let wrong_role = User::new("aud-1", "Ann", Role::Auditor);
        match machine.reassign(&mut paper, 1, &admin, &wrong_role, t0()) {
            Err(WorkflowError::Validation { field, message }) => {
                assert_eq!(field, "assigned_user");
                assert!(message.contains("sps"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let inactive = User::new("sps-9", "Old", Role::Sps).deactivated();
        assert!(machine.reassign(&mut paper, 1, &admin, &inactive, t0()).is_err());

        let target = User::new("sps-2", "Sue", Role::Sps);
        let events = machine.reassign(&mut paper, 1, &admin, &target, t0()).unwrap();
        assert_eq!(paper.stage(1).unwrap().assigned_user, Some(target.id.clone()));
        assert_eq!(paper.stage(1).unwrap().status, StageStatus::InProgress);
        assert_eq!(events[0].recipients(), vec![Recipient::User(target.id)]);
    }

    #[test]
    fn test_reassign_future_pending_stage_allowed_closed_stage_conflicts() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        let admin = user(Role::Admin);

        machine
            .reassign(&mut paper, 8, &admin, &User::new("acc-2", "Cy", Role::Accounting), t0())
            .unwrap();
        assert_eq!(paper.stage(8).unwrap().status, StageStatus::Pending);

        approve(&machine, &mut paper, 1, t0());
        assert!(matches!(
            machine.reassign(&mut paper, 1, &admin, &User::new("sps-2", "Sue", Role::Sps), t0()),
            Err(WorkflowError::StateConflict(_))
        ));
    }

    #[test]
    fn test_audit_trail_is_dense() {
        let machine = StageStateMachine::new();
        let mut paper = started_paper();
        approve(&machine, &mut paper, 1, t0());
        machine
            .return_stage(&mut paper, 2, &user(Role::VpAcad), "redo", t0())
            .unwrap();

        let actions: Vec<_> = paper.audit.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Submitted,
                AuditAction::StageActivated,
                AuditAction::StageApproved,
                AuditAction::StageActivated,
                AuditAction::StageReturned,
                AuditAction::StageActivated,
            ]
        );
        assert!(paper
            .audit
            .iter()
            .enumerate()
            .all(|(i, e)| e.sequence == i as u64));
    }
}
