use crate::access::DenyReason;
use crate::incident::IncidentStatus;
use crate::lifecycle::IncidentAction;
use crate::types::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid transition: cannot {action} an incident that is {from}")]
    InvalidTransition {
        from: IncidentStatus,
        action: IncidentAction,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(DenyReason),

    #[error("Profile reconciliation failed: {0}")]
    ProfileReconciliationFailed(String),

    #[error("Transient store failure: {0}")]
    TransientStoreFailure(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may retry the same request unchanged.
    ///
    /// Only transient store failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientStoreFailure(_))
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::ProfileReconciliationFailed(_) => "PROFILE_RECONCILIATION_FAILED",
            CoreError::TransientStoreFailure(_) => "TRANSIENT_STORE_FAILURE",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(CoreError::TransientStoreFailure("timeout".into()).is_retryable());
        assert!(!CoreError::Forbidden(DenyReason::IncidentClosed).is_retryable());
        assert!(!CoreError::InvalidTransition {
            from: IncidentStatus::Resolved,
            action: IncidentAction::Cancel,
        }
        .is_retryable());
    }

    #[test]
    fn forbidden_message_carries_reason() {
        let err = CoreError::Forbidden(DenyReason::IncidentClosed);
        assert_eq!(err.to_string(), "Forbidden: incident closed");
    }

    #[test]
    fn invalid_transition_message_names_state_and_action() {
        let err = CoreError::InvalidTransition {
            from: IncidentStatus::Cancelled,
            action: IncidentAction::Approve,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot approve an incident that is cancelled"
        );
    }
}
