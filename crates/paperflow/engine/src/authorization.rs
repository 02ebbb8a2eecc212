//! Authorization policy: who may act on a stage and who may read a paper
//!
//! The policy only makes decisions. It never looks anything up; the caller
//! hands it the authenticated user and the stage or paper in question.

use paperflow_types::*;

/// Role and assignment based authorization decisions
#[derive(Clone, Debug, Default)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Whether `user` may act on `stage` at all.
    ///
    /// Inactive users never may. Administrators always may. Everyone else
    /// must hold the stage's role and, when the stage is assigned to a
    /// specific user, be that user.
    pub fn can_act(&self, user: &User, stage: &WorkflowStage) -> bool {
        self.denial_reason(user, stage).is_none()
    }

    /// Authorize a state-changing action on `stage`.
    ///
    /// Fails with `Forbidden` (naming the rule) when [`can_act`](Self::can_act)
    /// does not hold, and with `StateConflict` when the stage has already
    /// been closed.
    pub fn authorize_mutation(&self, user: &User, stage: &WorkflowStage) -> WorkflowResult<()> {
        if let Some(reason) = self.denial_reason(user, stage) {
            return Err(WorkflowError::forbidden(&user.id, reason));
        }
        if !stage.is_open() {
            return Err(WorkflowError::StateConflict(format!(
                "stage {} ({}) is already {}",
                stage.stage_order, stage.stage_name, stage.status
            )));
        }
        Ok(())
    }

    /// Only active administrators may reassign stages
    pub fn require_admin(&self, user: &User) -> WorkflowResult<()> {
        if !user.is_active {
            return Err(WorkflowError::forbidden(&user.id, "account is inactive"));
        }
        match user.role {
            Role::Admin => Ok(()),
            other => Err(WorkflowError::forbidden(
                &user.id,
                format!("role '{}' may not reassign stages, 'admin' is required", other),
            )),
        }
    }

    /// Read access is independent of stage status: the requisitioner, any
    /// administrator, and every holder of a role that owns one of the
    /// paper's stages may read it.
    pub fn can_read(&self, user: &User, paper: &ConceptPaper) -> bool {
        if !user.is_active {
            return false;
        }
        match user.role {
            Role::Admin => true,
            _ if user.id == paper.requisitioner => true,
            Role::Sps | Role::VpAcad | Role::Auditor | Role::Accounting => paper
                .stages
                .iter()
                .any(|s| {
                    s.assigned_role == user.role || s.assigned_user.as_ref() == Some(&user.id)
                }),
            Role::Requisitioner => false,
        }
    }

    pub fn authorize_read(&self, user: &User, paper: &ConceptPaper) -> WorkflowResult<()> {
        if self.can_read(user, paper) {
            Ok(())
        } else if !user.is_active {
            Err(WorkflowError::forbidden(&user.id, "account is inactive"))
        } else {
            Err(WorkflowError::forbidden(
                &user.id,
                format!(
                    "role '{}' has no access to paper {}",
                    user.role, paper.tracking_number
                ),
            ))
        }
    }

    fn denial_reason(&self, user: &User, stage: &WorkflowStage) -> Option<String> {
        if !user.is_active {
            return Some("account is inactive".to_string());
        }
        match user.role {
            Role::Admin => None,
            Role::Sps | Role::VpAcad | Role::Auditor | Role::Accounting | Role::Requisitioner => {
                if user.role != stage.assigned_role {
                    return Some(format!(
                        "role '{}' cannot act on stage {} ({}), which requires '{}'",
                        user.role, stage.stage_order, stage.stage_name, stage.assigned_role
                    ));
                }
                match &stage.assigned_user {
                    Some(assignee) if assignee != &user.id => Some(format!(
                        "stage {} ({}) is assigned to user '{}'",
                        stage.stage_order, stage.stage_name, assignee
                    )),
                    _ => None,
                }
            }
        }
    }
}
