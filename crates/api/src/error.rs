use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use firewatch_core::error::CoreError;
use firewatch_db::StoreError;
use firewatch_events::SyncError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Missing or invalid credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        AppError::Core(err.into())
    }
}

impl AppError {
    /// Status, machine code, and client-safe message for this error.
    ///
    /// Shared by HTTP responses and WebSocket error frames.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(core) => {
                let status = match core {
                    CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                    // Authenticated, but the role does not allow the action.
                    CoreError::Unauthorized(_) => StatusCode::FORBIDDEN,
                    CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                    CoreError::ProfileReconciliationFailed(_) => StatusCode::CONFLICT,
                    CoreError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match core {
                    CoreError::Internal(msg) => {
                        tracing::error!(error = %msg, "Internal core error");
                        "An internal error occurred".to_string()
                    }
                    CoreError::TransientStoreFailure(msg) => {
                        tracing::warn!(error = %msg, "Transient store failure");
                        "Service temporarily unavailable, please retry".to_string()
                    }
                    CoreError::Forbidden(reason) => reason.message().to_string(),
                    other => other.to_string(),
                };
                (status, core.code(), message)
            }
            AppError::Unauthenticated(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
