//! Error types for the concept paper workflow

use crate::{PaperId, StageId};

/// Errors surfaced by workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Unknown deadline option: {0}")]
    UnknownDeadlineOption(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("User '{user}' is not allowed to do this: {reason}")]
    Forbidden { user: String, reason: String },

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Concept paper not found: {0}")]
    PaperNotFound(PaperId),

    #[error("Stage not found: {0}")]
    StageNotFound(StageId),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(user: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            user: user.to_string(),
            reason: reason.into(),
        }
    }

    /// Where this error falls in the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::UnknownDeadlineOption(_) => ErrorKind::Validation,
            Self::Unauthenticated | Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::StateConflict(_) | Self::Storage(StorageError::Conflict(_)) => {
                ErrorKind::StateConflict
            }
            Self::PaperNotFound(_) | Self::StageNotFound(_) => ErrorKind::NotFound,
            Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::InvariantViolation(_) | Self::Storage(StorageError::Backend(_)) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status an API layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Forbidden { .. } => 403,
            _ => match self.kind() {
                ErrorKind::Validation => 422,
                ErrorKind::Authorization => 403,
                ErrorKind::StateConflict => 409,
                ErrorKind::NotFound => 404,
                ErrorKind::Internal => 500,
            },
        }
    }
}

/// Coarse error classification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    NotFound,
    Internal,
}

/// Errors raised by persistence backends
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate key, or a write raced with a newer version
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
