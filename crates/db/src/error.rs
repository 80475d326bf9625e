//! Store-level error type and its mapping onto the domain taxonomy.

use firewatch_core::access::DenyReason;
use firewatch_core::error::CoreError;
use firewatch_core::incident::IncidentStatus;
use firewatch_core::types::EntityId;

/// PostgreSQL SQLSTATE for unique violations.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: EntityId },

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A compare-and-swap update found a different current status.
    #[error("Incident {id} is no longer {expected}")]
    StatusMismatch {
        id: EntityId,
        expected: IncidentStatus,
    },

    /// A message was offered to an incident that no longer takes chat.
    #[error("Incident {id} is closed to chat")]
    IncidentClosed { id: EntityId },

    /// Timeout or lost connection; safe to retry.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// A stored value could not be decoded into a domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    /// Classify a sqlx error.
    ///
    /// - Unique violations (23505) become [`StoreError::Conflict`].
    /// - Pool timeouts, closed pools, and I/O failures become
    ///   [`StoreError::Transient`].
    /// - Everything else is kept as [`StoreError::Database`].
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                let constraint = db_err.constraint().unwrap_or("unknown");
                StoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::IncidentClosed { .. } => CoreError::Forbidden(DenyReason::IncidentClosed),
            StoreError::Transient(msg) => CoreError::TransientStoreFailure(msg),
            other => {
                tracing::error!(error = %other, "Unexpected store error");
                CoreError::Internal(other.to_string())
            }
        }
    }
}
