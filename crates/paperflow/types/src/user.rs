//! Users and the authentication context handed to the engine

use crate::{Role, UserId, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

/// A user as seen by the workflow. Authentication happens elsewhere;
/// the engine trusts these fields as given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            role,
            is_active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The caller of an engine operation.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    user: Option<User>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The authenticated user, or `Unauthenticated`.
    pub fn require_user(&self) -> WorkflowResult<&User> {
        self.user.as_ref().ok_or(WorkflowError::Unauthenticated)
    }
}

impl From<User> for AuthContext {
    fn from(user: User) -> Self {
        Self::user(user)
    }
}
