//! Roles held by users and owned by stages

use serde::{Deserialize, Serialize};

/// The closed set of roles known to the workflow.
///
/// Stage ownership is limited to [`Role::Sps`], [`Role::VpAcad`],
/// [`Role::Auditor`] and [`Role::Accounting`]. Requisitioners submit papers;
/// administrators may act on any stage and reassign stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requisitioner,
    Sps,
    VpAcad,
    Auditor,
    Accounting,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requisitioner => "requisitioner",
            Role::Sps => "sps",
            Role::VpAcad => "vp_acad",
            Role::Auditor => "auditor",
            Role::Accounting => "accounting",
            Role::Admin => "admin",
        }
    }

    /// Whether stages in the stage table can be owned by this role
    pub fn owns_stages(&self) -> bool {
        match self {
            Role::Sps | Role::VpAcad | Role::Auditor | Role::Accounting => true,
            Role::Requisitioner | Role::Admin => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requisitioner" => Ok(Role::Requisitioner),
            "sps" => Ok(Role::Sps),
            "vp_acad" => Ok(Role::VpAcad),
            "auditor" => Ok(Role::Auditor),
            "accounting" => Ok(Role::Accounting),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}
