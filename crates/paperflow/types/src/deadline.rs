//! Deadline options offered at submission time
//!
//! An option is consulted once, to compute the paper's overall
//! `deadline_date`. It is not referenced afterwards.

use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Longest overall deadline a catalog may offer
pub const MAX_DEADLINE_DAYS: u32 = 3650;

/// A selectable overall deadline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineOption {
    pub key: String,
    pub label: String,
    pub days: u32,
    pub sort_order: u32,
}

impl DeadlineOption {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        days: u32,
        sort_order: u32,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            days,
            sort_order,
        }
    }

    /// The overall deadline for a paper submitted at `submitted_at`
    pub fn deadline_from(&self, submitted_at: DateTime<Utc>) -> WorkflowResult<DateTime<Utc>> {
        Duration::try_days(i64::from(self.days))
            .and_then(|days| submitted_at.checked_add_signed(days))
            .ok_or_else(|| {
                WorkflowError::validation(
                    "deadline_option",
                    format!("option '{}' puts the deadline out of range", self.key),
                )
            })
    }
}

/// The set of deadline options, kept sorted by `sort_order`
#[derive(Clone, Debug)]
pub struct DeadlineCatalog {
    options: Vec<DeadlineOption>,
}

impl DeadlineCatalog {
    /// Build a catalog, rejecting duplicate keys and options outside
    /// `1..=MAX_DEADLINE_DAYS` days.
    pub fn new(mut options: Vec<DeadlineOption>) -> WorkflowResult<Self> {
        let mut seen = HashSet::new();
        for option in &options {
            if option.key.trim().is_empty() {
                return Err(WorkflowError::validation(
                    "deadline_option",
                    "option key must not be blank",
                ));
            }
            if option.days == 0 {
                return Err(WorkflowError::validation(
                    "deadline_option",
                    format!("option '{}' must allow at least one day", option.key),
                ));
            }
            if option.days > MAX_DEADLINE_DAYS {
                return Err(WorkflowError::validation(
                    "deadline_option",
                    format!(
                        "option '{}' allows {} days, at most {} are allowed",
                        option.key, option.days, MAX_DEADLINE_DAYS
                    ),
                ));
            }
            if !seen.insert(option.key.clone()) {
                return Err(WorkflowError::validation(
                    "deadline_option",
                    format!("duplicate option key '{}'", option.key),
                ));
            }
        }
        options.sort_by_key(|o| o.sort_order);
        Ok(Self { options })
    }

    /// The options offered out of the box
    pub fn standard() -> Self {
        Self {
            options: vec![
                DeadlineOption::new("1_week", "1 Week", 7, 1),
                DeadlineOption::new("2_weeks", "2 Weeks", 14, 2),
                DeadlineOption::new("1_month", "1 Month", 30, 3),
                DeadlineOption::new("2_months", "2 Months", 60, 4),
            ],
        }
    }

    pub fn get(&self, key: &str) -> Option<&DeadlineOption> {
        self.options.iter().find(|o| o.key == key)
    }

    /// Resolve a submitted key or fail with `UnknownDeadlineOption`
    pub fn resolve(&self, key: &str) -> WorkflowResult<&DeadlineOption> {
        self.get(key)
            .ok_or_else(|| WorkflowError::UnknownDeadlineOption(key.to_string()))
    }

    pub fn options(&self) -> &[DeadlineOption] {
        &self.options
    }
}

impl Default for DeadlineCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
