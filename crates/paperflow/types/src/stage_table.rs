//! The static stage table
//!
//! Nine stage templates, ordered 1..=9 with no gaps. The table is pure
//! data; behavior lives in the stage engine.

use crate::{Role, WorkflowError, WorkflowResult};
use serde::Serialize;

/// Number of stages every concept paper passes through
pub const STAGE_COUNT: usize = 9;

/// Order of the first stage
pub const FIRST_STAGE: u8 = 1;

/// Order of the final stage
pub const FINAL_STAGE: u8 = STAGE_COUNT as u8;

/// One row of the stage table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    /// 1-based position in the workflow
    pub order: u8,
    pub name: &'static str,
    /// The role that owns stage instances created from this row
    pub role: Role,
    /// Days allowed from activation to the stage deadline
    pub max_days: u32,
}

impl StageDefinition {
    pub fn is_first(&self) -> bool {
        self.order == FIRST_STAGE
    }

    pub fn is_final(&self) -> bool {
        self.order == FINAL_STAGE
    }
}

pub static STAGE_DEFINITIONS: [StageDefinition; STAGE_COUNT] = [
    StageDefinition {
        order: 1,
        name: "SPS Review",
        role: Role::Sps,
        max_days: 1,
    },
    StageDefinition {
        order: 2,
        name: "VP Acad Review",
        role: Role::VpAcad,
        max_days: 3,
    },
    StageDefinition {
        order: 3,
        name: "Auditing Review",
        role: Role::Auditor,
        max_days: 3,
    },
    StageDefinition {
        order: 4,
        name: "Acad Copy Distribution",
        role: Role::Sps,
        max_days: 1,
    },
    StageDefinition {
        order: 5,
        name: "Auditing Copy Distribution",
        role: Role::Auditor,
        max_days: 1,
    },
    StageDefinition {
        order: 6,
        name: "Voucher Preparation",
        role: Role::Accounting,
        max_days: 1,
    },
    StageDefinition {
        order: 7,
        name: "Audit & Countersign",
        role: Role::Auditor,
        max_days: 1,
    },
    StageDefinition {
        order: 8,
        name: "Cheque Preparation",
        role: Role::Accounting,
        max_days: 4,
    },
    StageDefinition {
        order: 9,
        name: "Budget Release",
        role: Role::Accounting,
        max_days: 1,
    },
];

/// Look up a stage definition by its 1-based order
pub fn stage_definition(order: u8) -> Option<&'static StageDefinition> {
    let index = usize::from(order).checked_sub(1)?;
    STAGE_DEFINITIONS.get(index)
}

/// All stage definitions in workflow order
pub fn stage_definitions() -> &'static [StageDefinition] {
    &STAGE_DEFINITIONS
}

/// Check that a table is dense and ordered 1..=n, that every row is owned
/// by a stage role, and that every row allows at least one day.
pub fn validate_stage_table(table: &[StageDefinition]) -> WorkflowResult<()> {
    if table.is_empty() {
        return Err(WorkflowError::InvariantViolation(
            "stage table is empty".into(),
        ));
    }
    for (index, def) in table.iter().enumerate() {
        let expected = index + 1;
        if usize::from(def.order) != expected {
            return Err(WorkflowError::InvariantViolation(format!(
                "stage table row {} has order {}, expected {}",
                index, def.order, expected
            )));
        }
        if !def.role.owns_stages() {
            return Err(WorkflowError::InvariantViolation(format!(
                "stage '{}' is owned by role '{}' which cannot own stages",
                def.name, def.role
            )));
        }
        if def.max_days == 0 {
            return Err(WorkflowError::InvariantViolation(format!(
                "stage '{}' allows zero days",
                def.name
            )));
        }
    }
    Ok(())
}
