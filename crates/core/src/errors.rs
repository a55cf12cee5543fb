use thiserror::Error;

use crate::domain::recommendation::RecommendationStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid recommendation transition from {from:?} to {to:?}")]
    InvalidRecommendationTransition {
        from: RecommendationStatus,
        to: RecommendationStatus,
    },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure taxonomy shared by the workflow, simulator, and backtester.
///
/// Every variant names the offending entity or precondition so callers can
/// report actionable messages without re-deriving context. `Unavailable` is
/// the only retryable class.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("recommendation has expired: {id}")]
    Expired { id: String },
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Whether a retry of the same call can reasonably succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable class used in command output and logs.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Expired { .. } => "expired",
            Self::Unavailable(_) => "unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidRecommendationTransition { from, to } => Self::InvalidState(
                format!("cannot transition recommendation from {from:?} to {to:?}"),
            ),
            DomainError::InvariantViolation(message) => Self::InvalidArgument(message),
        }
    }
}
