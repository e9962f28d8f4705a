use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{ReservationId, UserId};
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("invalid range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("malformed date '{0}', expected YYYY-MM-DD")]
    MalformedDate(String),
    #[error("{requester} may not {action}")]
    PermissionDenied {
        requester: UserId,
        action: &'static str,
    },
    #[error("reservation not found: {0}")]
    NotFound(ReservationId),
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    #[error("cannot assign to {user}: {reason}")]
    InvalidTarget { user: UserId, reason: &'static str },
    #[error("overlaps primary reservation {0}")]
    Conflict(ReservationId),
    #[error("overlapping primary reservations: {0:?}")]
    InvariantViolation(Vec<ReservationId>),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl EngineError {
    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::InvalidRange { .. } | EngineError::MalformedDate(_) => "invalid_range",
            EngineError::PermissionDenied { .. } => "permission_denied",
            EngineError::NotFound(_) => "not_found",
            EngineError::UserNotFound(_) => "user_not_found",
            EngineError::InvalidTarget { .. } => "invalid_target",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }

    /// True for faults on our side rather than bad requests.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, EngineError::InvariantViolation(_) | EngineError::Storage(_))
    }
}
